//! Broadcast variant of [`Function`]: firing invokes every listener in order.

use std::future::Future;
use std::sync::Arc;

use crate::function::Function;
use crate::registry::Registry;

/// A named event with an ordered listener list.
///
/// Listeners are Functions and run sequentially in registration order; return
/// values are discarded. The trigger itself is a Function, so `before`/`after`
/// hooks wrap the whole fan-out.
pub struct Trigger<A> {
    function: Function<A, ()>,
    listeners: Arc<Registry<Function<A, ()>>>,
}

impl<A> Clone for Trigger<A> {
    fn clone(&self) -> Self {
        Self {
            function: self.function.clone(),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<A> std::fmt::Debug for Trigger<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("function", &self.function)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<A> Trigger<A>
where
    A: Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let listeners: Arc<Registry<Function<A, ()>>> = Arc::new(Registry::new());
        let fan_out = Arc::clone(&listeners);
        let trigger_name = name.clone();
        let function = Function::new(name, move |args: A| {
            let listeners = fan_out.snapshot();
            let trigger_name = trigger_name.clone();
            async move {
                tracing::debug!(trigger = %trigger_name, listeners = listeners.len(), "firing");
                for listener in listeners {
                    listener.call(args.clone()).await?;
                }
                Ok(())
            }
        });
        Self {
            function,
            listeners,
        }
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    /// Register a listener; it runs after every listener registered before it.
    pub fn on(&self, name: impl Into<String>, listener: Function<A, ()>) -> &Self {
        let name = name.into();
        tracing::debug!(trigger = %self.function.name(), listener = %name, "listener registered");
        self.listeners.register(listener);
        self
    }

    /// Closure form of [`on`](Self::on).
    pub fn on_fn<F, Fut>(&self, name: impl Into<String>, f: F) -> &Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        self.on(name.clone(), Function::new(name, f))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// The underlying Function, for attaching `before`/`after` hooks.
    pub fn function(&self) -> &Function<A, ()> {
        &self.function
    }

    /// Invoke all listeners sequentially. A failing listener aborts the fire.
    pub async fn fire(&self, args: A) -> anyhow::Result<()> {
        self.function.call(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn listeners_fire_sequentially_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let t: Trigger<u32> = Trigger::new("tick");
        for (name, delay) in [("first", 30u64), ("second", 0), ("third", 10)] {
            let l = log.clone();
            t.on_fn(name, move |n: u32| {
                let l = l.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    l.lock().push(format!("{name}:{n}"));
                    Ok(())
                }
            });
        }

        t.fire(7).await.unwrap();
        assert_eq!(*log.lock(), vec!["first:7", "second:7", "third:7"]);
    }

    #[tokio::test]
    async fn failing_listener_stops_the_fan_out() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let t: Trigger<()> = Trigger::new("boot");
        t.on_fn("fails", |_| async { Err(anyhow::anyhow!("nope")) });
        let l = log.clone();
        t.on_fn("never", move |_| {
            let l = l.clone();
            async move {
                l.lock().push("never");
                Ok(())
            }
        });

        assert!(t.fire(()).await.is_err());
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn trigger_hooks_wrap_the_fan_out() {
        let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let t: Trigger<()> = Trigger::new("start");
        let l = log.clone();
        t.on_fn("listener", move |_| {
            let l = l.clone();
            async move {
                l.lock().push("listener");
                Ok(())
            }
        });
        let l = log.clone();
        t.function().before_fn("guard", move |_| {
            let l = l.clone();
            async move {
                l.lock().push("before");
                Ok(())
            }
        });

        t.fire(()).await.unwrap();
        assert_eq!(*log.lock(), vec!["before", "listener"]);
        assert_eq!(t.listener_count(), 1);
    }
}
