//! Hookable async functions.
//!
//! A [`Function`] wraps an async callable with two ordered hook chains:
//! `before` hooks thread (and may replace) the argument value, `after` hooks
//! see the result together with the final arguments and may replace the result.
//! Hooks are Functions themselves, so they can carry hooks of their own.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::registry::Registry;

type Callable<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, anyhow::Result<O>> + Send + Sync>;

/// Input of an `after` hook: the current result plus the arguments the
/// wrapped callable was invoked with (after all `before` hooks ran).
#[derive(Debug, Clone)]
pub struct AfterCall<A, R> {
    pub result: R,
    pub args: A,
}

struct Hook<I, O> {
    name: Arc<str>,
    run: Callable<I, O>,
}

impl<I, O> Clone for Hook<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            run: Arc::clone(&self.run),
        }
    }
}

struct Inner<A, R> {
    name: Arc<str>,
    call: Callable<A, R>,
    before: Registry<Hook<A, A>>,
    after: Registry<Hook<AfterCall<A, R>, R>>,
}

/// A named, hookable async operation `A -> Result<R>`.
///
/// Cloning is cheap and keeps the identity: hooks registered through any clone
/// apply to every clone. Multi-argument operations take a tuple as `A`.
pub struct Function<A, R> {
    inner: Arc<Inner<A, R>>,
}

impl<A, R> Clone for Function<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> std::fmt::Debug for Function<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.inner.name)
            .field("before", &self.inner.before.len())
            .field("after", &self.inner.after.len())
            .finish()
    }
}

impl<A, R> Function<A, R>
where
    A: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let call: Callable<A, R> =
            Arc::new(move |args: A| -> BoxFuture<'static, anyhow::Result<R>> { Box::pin(f(args)) });
        Self {
            inner: Arc::new(Inner {
                name: Arc::from(name.into()),
                call,
                before: Registry::new(),
                after: Registry::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of registered `before` and `after` hooks.
    pub fn hook_counts(&self) -> (usize, usize) {
        (self.inner.before.len(), self.inner.after.len())
    }

    /// Register a hook that runs before the callable and returns the
    /// (possibly transformed) arguments.
    pub fn before(&self, name: impl Into<String>, hook: Function<A, A>) -> &Self {
        let name: Arc<str> = Arc::from(name.into());
        tracing::debug!(function = %self.inner.name, hook = %name, "registering before hook");
        self.inner.before.register(Hook {
            name,
            run: Arc::new(move |args: A| hook.call(args)),
        });
        self
    }

    /// Closure form of [`before`](Self::before).
    pub fn before_fn<F, Fut>(&self, name: impl Into<String>, f: F) -> &Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<A>> + Send + 'static,
    {
        let name = name.into();
        self.before(name.clone(), Function::new(name, f))
    }

    /// Invoke the chain: `before` hooks, the callable, then `after` hooks,
    /// each awaited in registration order. The first error aborts the chain.
    pub fn call(&self, args: A) -> BoxFuture<'static, anyhow::Result<R>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { inner.run(args).await })
    }
}

impl<A, R> Function<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Register a hook that runs after the callable and may replace the result.
    pub fn after(&self, name: impl Into<String>, hook: Function<AfterCall<A, R>, R>) -> &Self {
        let name: Arc<str> = Arc::from(name.into());
        tracing::debug!(function = %self.inner.name, hook = %name, "registering after hook");
        self.inner.after.register(Hook {
            name,
            run: Arc::new(move |call: AfterCall<A, R>| hook.call(call)),
        });
        self
    }

    /// Closure form of [`after`](Self::after).
    pub fn after_fn<F, Fut>(&self, name: impl Into<String>, f: F) -> &Self
    where
        F: Fn(AfterCall<A, R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let name = name.into();
        self.after(name.clone(), Function::new(name, f))
    }
}

impl<A, R> Inner<A, R>
where
    A: Clone + Send + 'static,
    R: Send + 'static,
{
    async fn run(&self, mut args: A) -> anyhow::Result<R> {
        for hook in self.before.snapshot() {
            tracing::trace!(function = %self.name, hook = %hook.name, "before");
            args = (hook.run)(args).await?;
        }

        let mut result = (self.call)(args.clone()).await?;

        for hook in self.after.snapshot() {
            tracing::trace!(function = %self.name, hook = %hook.name, "after");
            result = (hook.run)(AfterCall {
                result,
                args: args.clone(),
            })
            .await?;
        }

        Ok(result)
    }
}
