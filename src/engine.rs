use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::error::EngineError;
use crate::model::{InferenceModel, RequestMetadata};

type Metadata<M> = <<M as InferenceModel>::Request as RequestMetadata>::Metadata;

type Outcome<M> = Result<<M as InferenceModel>::Response, <M as InferenceModel>::Error>;

type EngineReceiver<M> = Mutex<mpsc::Receiver<EngineResponse<Metadata<M>, Outcome<M>>>>;

/// Current state of the detection engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Ready to accept a request.
    Idle,
    /// A request has been accepted and has not produced a result yet.
    Processing,
    /// A result is waiting to be polled.
    Ready,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Processing => "processing",
            EngineState::Ready => "ready",
        }
    }
}

struct EngineRequest<Req> {
    id: u64,
    request: Req,
}

/// A finished inference together with its timing.
pub struct EngineResponse<Metadata, Res> {
    /// Identifier returned by [`DetectionEngine::schedule_inference`].
    pub id: u64,
    pub start_time: Instant,
    pub duration: Duration,
    pub request_metadata: Metadata,
    pub response: Res,
}

/// Result of polling the engine.
pub enum EngineResult<M: InferenceModel>
where
    M::Request: RequestMetadata,
{
    /// The model answered.
    Success(EngineResponse<Metadata<M>, M::Response>),
    /// The model ran and failed. The engine is ready for the next request.
    Failed(EngineResponse<Metadata<M>, M::Error>),
    /// Nothing to report yet.
    Empty(EngineState),
    /// The worker thread is gone.
    Error(String),
}

/// Runs one inference at a time on a dedicated worker thread.
///
/// Callers schedule a request, then poll for its result while showing
/// [`EngineState::Processing`]. A second request is refused until the result
/// of the first one has been polled, so at most one call to the model is ever
/// in flight and a poll never returns the result of an earlier request. A failed inference is reported through [`EngineResult::Failed`] and
/// does not stop the worker.
pub struct DetectionEngine<M: InferenceModel + Send + 'static>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    state: Arc<Mutex<EngineState>>,
    req_tx: Option<mpsc::Sender<EngineRequest<M::Request>>>,
    rep_rx: EngineReceiver<M>,
    worker: Option<JoinHandle<()>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<M: InferenceModel + Send + 'static> DetectionEngine<M>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Moves `model` onto a new worker thread and returns the engine driving it.
    pub fn new(mut model: M) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<EngineRequest<M::Request>>();
        let (rep_tx, rep_rx) = mpsc::channel::<EngineResponse<Metadata<M>, Outcome<M>>>();
        let state = Arc::new(Mutex::new(EngineState::Idle));

        let worker = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Running inference #{}", req.id);

                    let request_metadata = req.request.metadata();
                    let start_time = Instant::now();
                    let response = model.run(req.request);
                    let duration = start_time.elapsed();

                    match &response {
                        Ok(_) => log::debug!("Inference #{} completed in {duration:?}", req.id),
                        Err(e) => log::debug!("Inference #{} failed: {e}", req.id),
                    }

                    // The result and the ready state become visible together.
                    let mut state = lock(&state);
                    let _ = rep_tx.send(EngineResponse {
                        id: req.id,
                        start_time,
                        duration,
                        request_metadata,
                        response,
                    });
                    *state = EngineState::Ready;
                }
            }
        });

        Self {
            state,
            req_tx: Some(req_tx),
            rep_rx: Mutex::new(rep_rx),
            worker: Some(worker),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    /// Queues `request` and returns its id.
    ///
    /// Fails with [`EngineError::Busy`] while another request is processing
    /// and with [`EngineError::Unclaimed`] while its result has not been polled.
    pub fn schedule_inference(&self, request: M::Request) -> Result<u64, EngineError> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Stopped)?;

        let mut state = lock(&self.state);
        match *state {
            EngineState::Idle => {}
            EngineState::Processing => return Err(EngineError::Busy),
            EngineState::Ready => return Err(EngineError::Unclaimed),
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tx.send(EngineRequest { id, request })
            .map_err(|_| EngineError::Stopped)?;
        *state = EngineState::Processing;

        log::debug!("Scheduled inference #{id}");
        Ok(id)
    }

    /// Returns a finished result if one is waiting, without blocking.
    pub fn try_poll_response(&self) -> EngineResult<M> {
        match lock(&self.rep_rx).try_recv() {
            Ok(response) => self.claim(response),
            Err(mpsc::TryRecvError::Empty) => EngineResult::Empty(self.state()),
            Err(mpsc::TryRecvError::Disconnected) => {
                log::error!("Response channel disconnected");
                EngineResult::Error("Response channel disconnected".to_string())
            }
        }
    }

    /// Blocks until the next result arrives or `timeout` elapses.
    ///
    /// The receiver stays locked while waiting: a concurrent
    /// [`try_poll_response`](Self::try_poll_response) blocks until this call
    /// returns. Pollers that must not block should only use `try_poll_response`.
    pub fn wait_response(&self, timeout: Duration) -> EngineResult<M> {
        match lock(&self.rep_rx).recv_timeout(timeout) {
            Ok(response) => self.claim(response),
            Err(mpsc::RecvTimeoutError::Timeout) => EngineResult::Empty(self.state()),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::error!("Response channel disconnected");
                EngineResult::Error("Response channel disconnected".to_string())
            }
        }
    }

    // The worker sets `Ready` under the state lock after sending, so taking
    // the lock here orders this `Idle` after it.
    fn claim(&self, response: EngineResponse<Metadata<M>, Outcome<M>>) -> EngineResult<M> {
        *lock(&self.state) = EngineState::Idle;

        let EngineResponse {
            id,
            start_time,
            duration,
            request_metadata,
            response,
        } = response;

        match response {
            Ok(response) => EngineResult::Success(EngineResponse {
                id,
                start_time,
                duration,
                request_metadata,
                response,
            }),
            Err(response) => EngineResult::Failed(EngineResponse {
                id,
                start_time,
                duration,
                request_metadata,
                response,
            }),
        }
    }

    /// Closes the request channel and joins the worker once it drains.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl<M: InferenceModel + Send + 'static> Drop for DetectionEngine<M>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImagePayload;

    #[derive(Debug, thiserror::Error)]
    #[error("model failed on {0} bytes")]
    struct FakeError(usize);

    /// Answers with the payload length, fails on empty payloads.
    struct LengthModel;

    impl InferenceModel for LengthModel {
        type Request = ImagePayload;
        type Response = String;
        type Error = FakeError;

        fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
            if request.is_empty() {
                return Err(FakeError(0));
            }
            Ok(format!("{} bytes", request.len()))
        }
    }

    /// Blocks every inference until the test releases it.
    struct GatedModel(mpsc::Receiver<()>);

    impl InferenceModel for GatedModel {
        type Request = ImagePayload;
        type Response = String;
        type Error = FakeError;

        fn run(&mut self, _request: Self::Request) -> Result<Self::Response, Self::Error> {
            let _ = self.0.recv();
            Ok("Chanel".to_string())
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn starts_idle() {
        let engine = DetectionEngine::new(LengthModel);
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(matches!(
            engine.try_poll_response(),
            EngineResult::Empty(EngineState::Idle)
        ));
    }

    #[test]
    fn runs_a_request_to_completion() {
        let engine = DetectionEngine::new(LengthModel);
        let id = engine
            .schedule_inference(ImagePayload::new(vec![1, 2, 3]).with_file_name("bag.png"))
            .unwrap();

        match engine.wait_response(WAIT) {
            EngineResult::Success(response) => {
                assert_eq!(response.id, id);
                assert_eq!(response.response, "3 bytes");
                assert_eq!(response.request_metadata.size_bytes, 3);
                assert_eq!(
                    response.request_metadata.file_name.as_deref(),
                    Some("bag.png")
                );
            }
            _ => panic!("expected a successful inference"),
        }
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn unpolled_result_blocks_the_next_request() {
        let engine = DetectionEngine::new(LengthModel);
        let first = engine
            .schedule_inference(ImagePayload::new(vec![1]).with_file_name("a.jpg"))
            .unwrap();

        let deadline = Instant::now() + WAIT;
        while engine.state() != EngineState::Ready {
            assert!(Instant::now() < deadline, "inference never finished");
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(
            engine.schedule_inference(ImagePayload::new(vec![2, 2]).with_file_name("b.png")),
            Err(EngineError::Unclaimed)
        );

        match engine.try_poll_response() {
            EngineResult::Success(response) => {
                assert_eq!(response.id, first);
                assert_eq!(response.request_metadata.file_name.as_deref(), Some("a.jpg"));
            }
            _ => panic!("expected the first result"),
        }
        assert_eq!(engine.state(), EngineState::Idle);

        let second = engine
            .schedule_inference(ImagePayload::new(vec![2, 2]).with_file_name("b.png"))
            .unwrap();
        match engine.wait_response(WAIT) {
            EngineResult::Success(response) => {
                assert_eq!(response.id, second);
                assert_eq!(response.response, "2 bytes");
                assert_eq!(response.request_metadata.file_name.as_deref(), Some("b.png"));
            }
            _ => panic!("expected the second result"),
        }
    }

    #[test]
    fn failure_keeps_the_engine_usable() {
        let engine = DetectionEngine::new(LengthModel);

        engine.schedule_inference(ImagePayload::new(Vec::new())).unwrap();
        match engine.wait_response(WAIT) {
            EngineResult::Failed(response) => {
                assert_eq!(response.response.to_string(), "model failed on 0 bytes");
            }
            _ => panic!("expected a failed inference"),
        }

        engine.schedule_inference(ImagePayload::new(vec![7])).unwrap();
        assert!(matches!(engine.wait_response(WAIT), EngineResult::Success(_)));
    }

    #[test]
    fn refuses_a_second_request_while_processing() {
        let (release_tx, release_rx) = mpsc::channel();
        let engine = DetectionEngine::new(GatedModel(release_rx));

        let first = engine.schedule_inference(ImagePayload::new(vec![1])).unwrap();
        assert_eq!(engine.state(), EngineState::Processing);
        assert_eq!(
            engine.schedule_inference(ImagePayload::new(vec![2])),
            Err(EngineError::Busy)
        );

        release_tx.send(()).unwrap();
        match engine.wait_response(WAIT) {
            EngineResult::Success(response) => assert_eq!(response.id, first),
            _ => panic!("expected a successful inference"),
        }

        let second = engine.schedule_inference(ImagePayload::new(vec![3])).unwrap();
        assert_eq!(second, first + 1);
        release_tx.send(()).unwrap();
        assert!(matches!(engine.wait_response(WAIT), EngineResult::Success(_)));
    }

    #[test]
    fn stopped_engine_rejects_requests() {
        let mut engine = DetectionEngine::new(LengthModel);
        engine.stop();
        assert_eq!(
            engine.schedule_inference(ImagePayload::new(vec![1])),
            Err(EngineError::Stopped)
        );
        assert!(matches!(engine.try_poll_response(), EngineResult::Error(_)));
    }
}
