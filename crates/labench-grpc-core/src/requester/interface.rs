use crate::common::Result;
use tonic::Status;

/// A per-worker handle that executes repeated unary calls.
///
/// Lifecycle: [`Self::setup`] once, [`Self::request`] any number of times,
/// [`Self::teardown`] once.
pub trait Requester: Send {
    /// Binds the outgoing call context. Calling it again rebinds an
    /// identical context.
    fn setup(&mut self) -> Result<()>;

    /// Issues exactly one call. Failures are returned verbatim; nothing is
    /// retried.
    fn request(&mut self) -> impl Future<Output = core::result::Result<(), Status>> + Send;

    /// Releases nothing; connections are owned by the factory.
    fn teardown(&mut self) -> Result<()>;
}

/// Hands out one [`Requester`] per simulated concurrent worker.
///
/// Safe to call from any number of tasks concurrently.
pub trait RequesterFactory: Send + Sync {
    type Requester: Requester;

    fn get_requester(
        &self,
        worker: u64,
    ) -> impl Future<Output = Result<Self::Requester>> + Send;
}
