//! Conversation session: one transcript, at most one request in flight.
//!
//! `Session` is the state machine. It admits a submission, streams the reply
//! through the frame decoder and classifier, folds every event into its
//! transcript and tells its observer about each append and status change.
//!
//! `spawn_session` runs a `Session` on its own task so a front end can keep
//! submitting while a reply streams in; submissions that arrive while the
//! session is busy are dropped, not queued.

use bc_backend::{parse_frame_stream, try_classify, BackendError, ChatTransport};
use bc_protocol::{ConversationEvent, SessionStatus, SessionUpdate, Transcript, Turn};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives every transcript append and status change, in order.
pub trait SessionObserver: Send {
    fn on_update(&mut self, update: &SessionUpdate);
}

impl SessionObserver for () {
    fn on_update(&mut self, _update: &SessionUpdate) {}
}

impl SessionObserver for Vec<SessionUpdate> {
    fn on_update(&mut self, update: &SessionUpdate) {
        self.push(update.clone());
    }
}

impl SessionObserver for mpsc::UnboundedSender<SessionUpdate> {
    fn on_update(&mut self, update: &SessionUpdate) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(update.clone());
    }
}

impl<O: SessionObserver + ?Sized> SessionObserver for Box<O> {
    fn on_update(&mut self, update: &SessionUpdate) {
        (**self).on_update(update);
    }
}

/// Why a submission was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejection {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a request is already in flight")]
    Busy,
}

/// How one exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The stream ended normally.
    Completed { events: usize, dropped: usize },
    /// The transport failed; an error turn was appended.
    Failed { reason: String },
    /// The read was abandoned; nothing further was appended.
    Cancelled,
}

pub struct Session<O> {
    transcript: Transcript,
    status: SessionStatus,
    observer: O,
    dropped_frames: usize,
}

impl<O: SessionObserver> Session<O> {
    pub fn new(observer: O) -> Self {
        Self {
            transcript: Transcript::new(),
            status: SessionStatus::Idle,
            observer,
            dropped_frames: 0,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Frames dropped as unclassifiable over the session's lifetime.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    pub fn into_parts(self) -> (Transcript, O) {
        (self.transcript, self.observer)
    }

    /// Admit a submission: go busy and append the user turn.
    ///
    /// Returns the trimmed message to send. Blank input and submissions
    /// while a request is in flight are rejected without touching the
    /// transcript.
    pub fn begin(&mut self, text: &str) -> Result<String, SubmitRejection> {
        if self.status.is_busy() {
            debug!("submission while awaiting a response; ignored");
            return Err(SubmitRejection::Busy);
        }
        let message = text.trim();
        if message.is_empty() {
            return Err(SubmitRejection::EmptyMessage);
        }
        let message = message.to_string();

        self.set_status(SessionStatus::AwaitingResponse);
        let turn = self.transcript.push_user(message.clone()).clone();
        self.notify_appended(turn);
        Ok(message)
    }

    /// Submit `text` and stream the reply to completion.
    pub async fn submit<T>(
        &mut self,
        transport: &T,
        text: &str,
    ) -> Result<ExchangeOutcome, SubmitRejection>
    where
        T: ChatTransport + ?Sized,
    {
        self.submit_with_cancel(transport, text, &CancellationToken::new())
            .await
    }

    /// Submit `text` and stream the reply until it ends, fails, or `cancel`
    /// fires.
    ///
    /// Dropping the returned future has the same effect as cancelling: the
    /// session goes back to idle and nothing more is appended.
    pub async fn submit_with_cancel<T>(
        &mut self,
        transport: &T,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<ExchangeOutcome, SubmitRejection>
    where
        T: ChatTransport + ?Sized,
    {
        let message = self.begin(text)?;
        let mut flight = InFlight { session: self };
        Ok(flight.stream_reply(transport, &message, cancel).await)
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            self.status = status;
            self.observer.on_update(&SessionUpdate::StatusChanged(status));
        }
    }

    fn notify_appended(&mut self, turn: Turn) {
        let index = self.transcript.len() - 1;
        self.observer
            .on_update(&SessionUpdate::TurnAppended { index, turn });
    }

    fn append_event(&mut self, event: ConversationEvent) {
        let turn = self.transcript.apply(event).clone();
        self.notify_appended(turn);
    }

    fn fail(&mut self, err: &BackendError) -> ExchangeOutcome {
        warn!(%err, "exchange failed");
        let reason = format!("request failed: {err}");
        let turn = self.transcript.push_error(reason.clone()).clone();
        self.notify_appended(turn);
        self.set_status(SessionStatus::Idle);
        ExchangeOutcome::Failed { reason }
    }
}

/// Borrow of a session with a request outstanding.
///
/// Returns the session to idle when dropped, so an abandoned exchange can
/// never leave it stuck awaiting a response.
struct InFlight<'a, O: SessionObserver> {
    session: &'a mut Session<O>,
}

impl<O: SessionObserver> InFlight<'_, O> {
    async fn stream_reply<T>(
        &mut self,
        transport: &T,
        message: &str,
        cancel: &CancellationToken,
    ) -> ExchangeOutcome
    where
        T: ChatTransport + ?Sized,
    {
        info!(chars = message.chars().count(), "sending message");

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ExchangeOutcome::Cancelled,
            opened = transport.open_chat(message) => match opened {
                Ok(body) => body,
                Err(err) => return self.session.fail(&err),
            },
        };

        let mut frames = parse_frame_stream(body);
        let mut events = 0;
        let mut dropped = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ExchangeOutcome::Cancelled,
                next = frames.next() => next,
            };

            match next {
                Some(Ok(frame)) => match try_classify(&frame.payload) {
                    Ok(event) => {
                        events += 1;
                        self.session.append_event(event);
                    }
                    Err(err) => {
                        dropped += 1;
                        self.session.dropped_frames += 1;
                        debug!(%err, payload = %frame.payload, "dropping unclassifiable frame");
                    }
                },
                Some(Err(err)) => return self.session.fail(&err),
                None => break,
            }
        }

        if dropped > 0 {
            warn!(dropped, "reply contained frames that could not be classified");
        }
        info!(events, dropped, end_marker = frames.saw_done(), "reply complete");

        self.session.set_status(SessionStatus::Idle);
        ExchangeOutcome::Completed { events, dropped }
    }
}

impl<O: SessionObserver> Drop for InFlight<'_, O> {
    fn drop(&mut self) {
        if self.session.status.is_busy() {
            debug!("exchange abandoned");
            self.session.set_status(SessionStatus::Idle);
        }
    }
}

/// The session task is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session task has stopped")]
pub struct SessionClosed;

type SubmitReply = oneshot::Sender<Result<ExchangeOutcome, SubmitRejection>>;

enum Command {
    Submit {
        text: String,
        reply: Option<SubmitReply>,
    },
    Cancel,
    Shutdown {
        reply: oneshot::Sender<Transcript>,
    },
}

/// Cloneable handle to a session running on its own task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Submit a message without waiting for the reply. Ignored if the
    /// session is busy or the text is blank.
    pub fn submit(&self, text: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(Command::Submit {
            text: text.into(),
            reply: None,
        })
    }

    /// Submit a message and wait for the exchange to end.
    pub async fn request(
        &self,
        text: impl Into<String>,
    ) -> Result<Result<ExchangeOutcome, SubmitRejection>, SessionClosed> {
        let (reply, outcome) = oneshot::channel();
        self.send(Command::Submit {
            text: text.into(),
            reply: Some(reply),
        })?;
        outcome.await.map_err(|_| SessionClosed)
    }

    /// Abandon the in-flight read, if any.
    pub fn cancel(&self) -> Result<(), SessionClosed> {
        self.send(Command::Cancel)
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Wait until no request is in flight.
    pub async fn wait_idle(&self) -> Result<(), SessionClosed> {
        let mut status = self.status.clone();
        status
            .wait_for(|s| !s.is_busy())
            .await
            .map(|_| ())
            .map_err(|_| SessionClosed)
    }

    /// Stop the session, cancelling any in-flight read, and return the
    /// final transcript.
    pub async fn shutdown(self) -> Result<Transcript, SessionClosed> {
        let (reply, transcript) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        transcript.await.map_err(|_| SessionClosed)
    }

    fn send(&self, command: Command) -> Result<(), SessionClosed> {
        self.commands.send(command).map_err(|_| SessionClosed)
    }
}

/// Mirrors status changes into the handle's watch channel before passing
/// updates on.
struct StatusMirror<O> {
    inner: O,
    status: watch::Sender<SessionStatus>,
}

impl<O: SessionObserver> SessionObserver for StatusMirror<O> {
    fn on_update(&mut self, update: &SessionUpdate) {
        if let SessionUpdate::StatusChanged(status) = update {
            self.status.send_replace(*status);
        }
        self.inner.on_update(update);
    }
}

/// Run a session on a new task.
pub fn spawn_session<T, O>(transport: T, observer: O) -> SessionHandle
where
    T: ChatTransport + 'static,
    O: SessionObserver + 'static,
{
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);
    let session = Session::new(StatusMirror {
        inner: observer,
        status: status_tx,
    });
    tokio::spawn(run_session(transport, session, commands_rx));
    SessionHandle {
        commands: commands_tx,
        status: status_rx,
    }
}

async fn run_session<T, O>(
    transport: T,
    mut session: Session<O>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) where
    T: ChatTransport,
    O: SessionObserver,
{
    while let Some(command) = commands.recv().await {
        match command {
            Command::Submit { text, reply } => {
                let cancel = CancellationToken::new();
                let mut closing = false;
                let mut shutdown_reply = None;

                let result = {
                    let exchange = session.submit_with_cancel(&transport, &text, &cancel);
                    tokio::pin!(exchange);
                    loop {
                        tokio::select! {
                            biased;
                            result = &mut exchange => break result,
                            command = commands.recv(), if !closing => match command {
                                Some(Command::Submit { reply, .. }) => {
                                    debug!("session busy; submission ignored");
                                    if let Some(reply) = reply {
                                        let _ = reply.send(Err(SubmitRejection::Busy));
                                    }
                                }
                                Some(Command::Cancel) => cancel.cancel(),
                                Some(Command::Shutdown { reply }) => {
                                    cancel.cancel();
                                    shutdown_reply = Some(reply);
                                    closing = true;
                                }
                                None => {
                                    cancel.cancel();
                                    closing = true;
                                }
                            },
                        }
                    }
                };

                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
                if let Some(reply) = shutdown_reply {
                    let _ = reply.send(session.transcript().clone());
                }
                if closing {
                    return;
                }
            }
            Command::Cancel => debug!("cancel with no request in flight"),
            Command::Shutdown { reply } => {
                let _ = reply.send(session.transcript().clone());
                return;
            }
        }
    }
}
