//! Per-request context handed through the middleware pipeline.

use crate::http::{Extensions, Request};

/// The inbound [`Request`] plus request-scoped [`Extensions`].
///
/// Middleware may attach values before calling the next layer; handlers read
/// them back by type.
#[derive(Debug)]
pub struct Context {
    request: Request,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}
