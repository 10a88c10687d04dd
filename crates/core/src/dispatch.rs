use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use log::{debug, error, warn};

use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::throttle::{Admission, RateGate};
use crate::transport::{Request, Response, Transport, TransportError};

type Reply = std::result::Result<Response, TransportError>;

/// Puts the rate gate in front of every outbound call.
///
/// `submit` runs serialization, request assembly and the gate wait on the
/// caller's thread; the send itself runs on the dispatcher's worker pool, so a
/// caller is only held for as long as it is throttled.
pub struct Dispatcher<T, E> {
    gate: Arc<RateGate>,
    transport: Arc<T>,
    encoder: E,
    endpoint: String,
    pool: rayon::ThreadPool,
}

impl<T, E> Dispatcher<T, E>
where
    T: Transport + 'static,
{
    /// `io_threads == 0` sizes the send pool to the available parallelism.
    pub fn new(
        gate: Arc<RateGate>,
        transport: T,
        encoder: E,
        endpoint: impl Into<String>,
        io_threads: usize,
    ) -> Result<Self> {
        let threads = if io_threads == 0 {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4)
        } else {
            io_threads
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("regpush-send-{i}"))
            .panic_handler(|_| error!("send worker panicked; its caller sees a dropped response"))
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build send pool: {e}")))?;

        Ok(Self {
            gate,
            transport: Arc::new(transport),
            encoder,
            endpoint: endpoint.into(),
            pool,
        })
    }

    /// Serialize, sign, wait for the gate, then hand the request to a send worker.
    ///
    /// Serialization and signing failures return before the gate is touched.
    /// A closed gate returns [`Error::Closed`]. Transport failures arrive later
    /// through [`PendingResponse::wait`], and the admission stays spent.
    pub fn submit<D>(&self, document: &D, credential: &str) -> Result<PendingResponse>
    where
        D: ?Sized,
        E: Encoder<D>,
    {
        let body = self.encoder.encode(document)?;
        let request = Request::post(&self.endpoint, body)
            .with_header("Content-Type", self.encoder.content_type())
            .with_header("Authorization", bearer(credential)?);

        let admission = self.gate.acquire()?;
        debug!(
            "POST {} admitted in window {}",
            self.endpoint, admission.window
        );

        let (reply, rx) = mpsc::channel();
        let pending = PendingRequest {
            request,
            admission,
            reply,
        };
        let transport = Arc::clone(&self.transport);
        self.pool.spawn(move || pending.run(&*transport));

        Ok(PendingResponse { admission, rx })
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// `Authorization` value for an opaque token. The token itself is never
/// interpreted; it only has to be something an HTTP header can carry.
fn bearer(credential: &str) -> Result<String> {
    if let Some(c) = credential.chars().find(|c| c.is_control() && *c != '\t') {
        return Err(Error::Signing(format!(
            "credential contains control character {:?}",
            c
        )));
    }
    Ok(format!("Bearer {credential}"))
}

/// One admitted request travelling to a send worker.
struct PendingRequest {
    request: Request,
    admission: Admission,
    reply: Sender<Reply>,
}

impl PendingRequest {
    fn run<T: Transport + ?Sized>(self, transport: &T) {
        let result = transport.send(&self.request);
        if let Err(e) = &result {
            warn!(
                "{} {} (window {}) failed: {e}",
                self.request.method.as_str(),
                self.request.url,
                self.admission.window
            );
        }
        // The caller may have dropped its handle; nothing left to deliver to.
        let _ = self.reply.send(result);
    }
}

/// Caller-side handle for an admitted request.
///
/// Once `try_wait` or `wait_timeout` has produced a result the handle is
/// spent; later polls report [`Error::Disconnected`].
#[derive(Debug)]
pub struct PendingResponse {
    admission: Admission,
    rx: Receiver<Reply>,
}

impl PendingResponse {
    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// Block until the send worker reports back.
    pub fn wait(self) -> Result<Response> {
        match self.rx.recv() {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(Error::Disconnected),
        }
    }

    pub fn try_wait(&self) -> Option<Result<Response>> {
        match self.rx.try_recv() {
            Ok(reply) => Some(reply.map_err(Error::from)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::Disconnected)),
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<Response>> {
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => Some(reply.map_err(Error::from)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Error::Disconnected)),
        }
    }
}
