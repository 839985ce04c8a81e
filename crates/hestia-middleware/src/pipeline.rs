//! Middleware pipeline.
//!
//! A [`Pipeline`] is an ordered list of middleware stages in front of a
//! terminal handler. The pipeline is itself a [`Handler`], so a composed chain
//! can be handed to a driver, nested in another pipeline, or used as a fault
//! handler.
//!
//! Stages run in insertion order: the first stage added is the outermost one
//! and sees the exchange first on the way in and last on the way out.

use crate::middleware::{Middleware, Next};
use hestia_core::{BoxFuture, Handler, Request, RequestContext, ResponseWriter};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered middleware chain in front of a handler.
///
/// # Example
///
/// ```
/// use hestia_core::not_found;
/// use hestia_middleware::stages::RecoveryMiddleware;
/// use hestia_middleware::Pipeline;
///
/// let pipeline = Pipeline::builder()
///     .stage(RecoveryMiddleware::new())
///     .build(not_found());
///
/// assert_eq!(pipeline.stage_names(), vec!["recovery"]);
/// ```
pub struct Pipeline {
    /// Middleware stages, outermost first
    stages: Vec<BoxedMiddleware>,

    /// The terminal handler
    handler: Arc<dyn Handler>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Builds the middleware chain for one exchange.
    fn build_chain(&self) -> Next<'_> {
        // Start with the handler as the terminal point
        let mut next = Next::handler(self.handler.as_ref());

        // Wrap from the innermost stage outwards
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        next
    }

    /// Returns the names of all middleware stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl Handler for Pipeline {
    fn serve<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
    ) -> BoxFuture<'a, ()> {
        self.build_chain().run(ctx, request, response)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    /// Stages added so far
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty pipeline builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware stage.
    ///
    /// The stage runs inside every stage added before it.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware stage.
    #[must_use]
    pub fn shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Appends a stage only when `middleware` is `Some`.
    #[must_use]
    pub fn optional_stage<M: Middleware>(self, middleware: Option<M>) -> Self {
        match middleware {
            Some(middleware) => self.stage(middleware),
            None => self,
        }
    }

    /// Builds the pipeline with `handler` as its terminal point.
    #[must_use]
    pub fn build<H: Handler>(self, handler: H) -> Pipeline {
        self.build_shared(Arc::new(handler))
    }

    /// Builds the pipeline around an already shared handler.
    #[must_use]
    pub fn build_shared(self, handler: Arc<dyn Handler>) -> Pipeline {
        Pipeline {
            stages: self.stages,
            handler,
        }
    }
}
