//! Part declarations: identity tokens, dependency lists and async factories.
//!
//! A part is pure data until [`resolve_application`](crate::resolve_application)
//! runs its factory. Identity is the token, not the name: two parts may share a
//! name, and the same part supplied twice is still instantiated once.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::resolver::ResolveError;

static NEXT_PART_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique part identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(u64);

impl PartId {
    fn next() -> Self {
        Self(NEXT_PART_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Type-erased resolved output, shared by identity.
pub type Output = Arc<dyn Any + Send + Sync>;

type Factory<T> = Arc<dyn Fn(Deps) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;
type ErasedFactory = Arc<dyn Fn(Deps) -> BoxFuture<'static, anyhow::Result<Output>> + Send + Sync>;

/// Typed identity of a part.
///
/// Tokens can be created before the part they name, which lets a part declare
/// a dependency on something that is defined later.
pub struct PartToken<T> {
    id: PartId,
    name: Arc<str>,
    _output: PhantomData<fn() -> T>,
}

impl<T> Clone for PartToken<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            _output: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for PartToken<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartToken")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl<T> PartToken<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PartId::next(),
            name: Arc::from(name.into()),
            _output: PhantomData,
        }
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dependency reference for another part's dependency list.
    pub fn dep(&self) -> DepRef {
        DepRef {
            id: self.id,
            name: Arc::clone(&self.name),
        }
    }
}

/// Untyped dependency edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepRef {
    pub(crate) id: PartId,
    pub(crate) name: Arc<str>,
}

impl DepRef {
    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Anything that identifies a part producing `T`.
pub trait PartKey<T> {
    fn token(&self) -> &PartToken<T>;
}

impl<T> PartKey<T> for PartToken<T> {
    fn token(&self) -> &PartToken<T> {
        self
    }
}

impl<T> PartKey<T> for Part<T> {
    fn token(&self) -> &PartToken<T> {
        &self.token
    }
}

/// A declared unit of functionality producing `T` from its resolved dependencies.
pub struct Part<T> {
    token: PartToken<T>,
    deps: Vec<DepRef>,
    factory: Factory<T>,
}

impl<T> Clone for Part<T> {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            deps: self.deps.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T> std::fmt::Debug for Part<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Part")
            .field("token", &self.token)
            .field("deps", &self.deps.iter().map(|d| d.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Part<T> {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        deps: impl IntoIterator<Item = DepRef>,
        factory: F,
    ) -> Self
    where
        F: Fn(Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::with_token(PartToken::new(name), deps, factory)
    }

    /// Define the part behind a token created earlier.
    pub fn with_token<F, Fut>(
        token: PartToken<T>,
        deps: impl IntoIterator<Item = DepRef>,
        factory: F,
    ) -> Self
    where
        F: Fn(Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let factory: Factory<T> =
            Arc::new(move |deps: Deps| -> BoxFuture<'static, anyhow::Result<T>> {
                Box::pin(factory(deps))
            });
        Self {
            token,
            deps: deps.into_iter().collect(),
            factory,
        }
    }

    pub fn id(&self) -> PartId {
        self.token.id
    }

    pub fn name(&self) -> &str {
        self.token.name()
    }

    pub fn dependencies(&self) -> &[DepRef] {
        &self.deps
    }

    pub fn dep(&self) -> DepRef {
        self.token.dep()
    }

    pub fn erase(&self) -> AnyPart {
        AnyPart::from(self.clone())
    }
}

/// Type-erased part, the element type of the list handed to the resolver.
#[derive(Clone)]
pub struct AnyPart {
    pub(crate) id: PartId,
    pub(crate) name: Arc<str>,
    pub(crate) deps: Vec<DepRef>,
    pub(crate) build: ErasedFactory,
}

impl std::fmt::Debug for AnyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyPart")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("deps", &self.deps.iter().map(|d| d.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl AnyPart {
    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Send + Sync + 'static> From<Part<T>> for AnyPart {
    fn from(part: Part<T>) -> Self {
        let factory = part.factory;
        let build: ErasedFactory =
            Arc::new(move |deps: Deps| -> BoxFuture<'static, anyhow::Result<Output>> {
                let fut = factory(deps);
                Box::pin(async move {
                    let value = fut.await?;
                    Ok(Arc::new(value) as Output)
                })
            });
        Self {
            id: part.token.id,
            name: part.token.name,
            deps: part.deps,
            build,
        }
    }
}

impl<T: Send + Sync + 'static> From<&Part<T>> for AnyPart {
    fn from(part: &Part<T>) -> Self {
        part.erase()
    }
}

fn downcast<T: Send + Sync + 'static>(out: &Output, name: &str) -> Result<Arc<T>, ResolveError> {
    Arc::clone(out)
        .downcast::<T>()
        .map_err(|_| ResolveError::TypeMismatch {
            part: name.to_string(),
        })
}

/// Resolved outputs of the dependencies a part declared, handed to its factory.
pub struct Deps {
    owner: Arc<str>,
    outputs: HashMap<PartId, Output>,
}

impl Deps {
    pub(crate) fn new(owner: Arc<str>, outputs: HashMap<PartId, Output>) -> Self {
        Self { owner, outputs }
    }

    /// Name of the part whose factory receives these dependencies.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Shared output of a declared dependency.
    pub fn get<T: Send + Sync + 'static>(
        &self,
        key: &impl PartKey<T>,
    ) -> Result<Arc<T>, ResolveError> {
        let token = key.token();
        let out = self
            .outputs
            .get(&token.id)
            .ok_or_else(|| ResolveError::UndeclaredDependency {
                part: self.owner.to_string(),
                dependency: token.name().to_string(),
            })?;
        downcast(out, token.name())
    }
}

/// All outputs of a finished resolution, keyed by part identity.
#[derive(Clone, Default)]
pub struct Resolved {
    outputs: HashMap<PartId, Output>,
    order: Vec<Arc<str>>,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved").field("order", &self.order).finish()
    }
}

impl Resolved {
    pub(crate) fn insert(&mut self, id: PartId, name: Arc<str>, output: Output) {
        self.outputs.insert(id, output);
        self.order.push(name);
    }

    pub(crate) fn output(&self, id: &PartId) -> Option<&Output> {
        self.outputs.get(id)
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &impl PartKey<T>) -> Option<Arc<T>> {
        let token = key.token();
        self.outputs
            .get(&token.id)
            .and_then(|out| downcast(out, token.name()).ok())
    }

    /// Part names in the order their factories ran.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|n| n.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub(crate) fn take<T: Send + Sync + 'static>(
        &self,
        key: &impl PartKey<T>,
    ) -> Result<Arc<T>, ResolveError> {
        let token = key.token();
        let out = self
            .outputs
            .get(&token.id)
            .ok_or_else(|| ResolveError::MissingDependency {
                part: token.name().to_string(),
                required_by: None,
            })?;
        downcast(out, token.name())
    }
}
