use thiserror::Error;

use crate::errors::WorkloadError;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

impl HandlerError {
    pub fn rejected(message: impl Into<String>) -> Self {
        HandlerError::Rejected(message.into())
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Receives the decoded objects of the admission requests accepted by a hook.
///
/// Returning `Some` from `on_create` or `on_update` asks the hook to patch
/// the incoming object into the returned one. Returning an error rejects
/// the request.
pub trait ResourceHandler<T>: Send + Sync {
    fn on_create(&self, _obj: T) -> HandlerResult<Option<T>> {
        Ok(None)
    }

    fn on_update(&self, _old_obj: T, _new_obj: T) -> HandlerResult<Option<T>> {
        Ok(None)
    }

    fn on_delete(&self, _obj: T) -> HandlerResult<()> {
        Ok(())
    }
}

type CreateFn<T> = Box<dyn Fn(T) -> HandlerResult<Option<T>> + Send + Sync>;
type UpdateFn<T> = Box<dyn Fn(T, T) -> HandlerResult<Option<T>> + Send + Sync>;
type DeleteFn<T> = Box<dyn Fn(T) -> HandlerResult<()> + Send + Sync>;

/// A [`ResourceHandler`] made of optional closures. Missing closures behave
/// like the default, no-op, implementation.
pub struct ResourceHandlerFuncs<T> {
    create: Option<CreateFn<T>>,
    update: Option<UpdateFn<T>>,
    delete: Option<DeleteFn<T>>,
}

impl<T> Default for ResourceHandlerFuncs<T> {
    fn default() -> Self {
        ResourceHandlerFuncs {
            create: None,
            update: None,
            delete: None,
        }
    }
}

impl<T> ResourceHandlerFuncs<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create<F>(mut self, f: F) -> Self
    where
        F: Fn(T) -> HandlerResult<Option<T>> + Send + Sync + 'static,
    {
        self.create = Some(Box::new(f));
        self
    }

    pub fn with_update<F>(mut self, f: F) -> Self
    where
        F: Fn(T, T) -> HandlerResult<Option<T>> + Send + Sync + 'static,
    {
        self.update = Some(Box::new(f));
        self
    }

    pub fn with_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(T) -> HandlerResult<()> + Send + Sync + 'static,
    {
        self.delete = Some(Box::new(f));
        self
    }
}

impl<T> ResourceHandler<T> for ResourceHandlerFuncs<T> {
    fn on_create(&self, obj: T) -> HandlerResult<Option<T>> {
        match &self.create {
            Some(f) => f(obj),
            None => Ok(None),
        }
    }

    fn on_update(&self, old_obj: T, new_obj: T) -> HandlerResult<Option<T>> {
        match &self.update {
            Some(f) => f(old_obj, new_obj),
            None => Ok(None),
        }
    }

    fn on_delete(&self, obj: T) -> HandlerResult<()> {
        match &self.delete {
            Some(f) => f(obj),
            None => Ok(()),
        }
    }
}
