use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::Instrument;

use crate::engine::EngineCommand;
use crate::media::library::MediaItem;
use crate::resolve::Representation;
use crate::stream::pipeline::{PipelineError, PipelineExit, ProcessPipeline, Transcoder};
use crate::stream::range::ByteRange;

/// Chunks buffered between the source and the response body.
const CHANNEL_CHUNKS: usize = 4;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Init,
    RangeParsed,
    SourceOpened,
    Streaming,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("session is {actual:?}, expected {expected:?}")]
    State {
        actual: SessionState,
        expected: SessionState,
    },
}

impl SessionError {
    /// The failure is the transcode limit, not a broken source.
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionError::Pipeline(PipelineError::Busy(_)))
    }
}

enum Source {
    File(tokio::io::Take<tokio::fs::File>, u64),
    Pipeline(ProcessPipeline),
}

pub type SessionBody = ReceiverStream<io::Result<Bytes>>;

type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Delivery of one representation over one connection.
///
/// `Init → RangeParsed → SourceOpened → Streaming → Completed | Aborted`.
/// Byte ranges apply to direct representations only; transcoded output always
/// starts at byte 0 and is positioned in time by the engine instead.
pub struct StreamSession {
    id: u64,
    item: MediaItem,
    representation: Representation,
    start_secs: f64,
    range: ByteRange,
    source: Option<Source>,
    state: watch::Sender<SessionState>,
}

impl StreamSession {
    pub fn new(item: MediaItem, representation: Representation, start_secs: f64) -> Self {
        let start_secs = if representation.is_time_seekable() {
            start_secs.max(0.0)
        } else {
            0.0
        };
        let (state, _) = watch::channel(SessionState::Init);
        StreamSession {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            item,
            representation,
            start_secs,
            range: ByteRange::Full,
            source: None,
            state,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn item(&self) -> &MediaItem {
        &self.item
    }

    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    pub fn is_transcoded(&self) -> bool {
        !self.representation.is_direct()
    }

    pub fn mime(&self) -> &str {
        self.representation.mime(&self.item)
    }

    /// Start offset handed to the engine, when there is one.
    pub fn time_seek(&self) -> Option<f64> {
        (self.start_secs > 0.0).then_some(self.start_secs)
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// Size of the full resource. Unknown for transcoded output.
    pub fn total_length(&self) -> Option<u64> {
        (!self.is_transcoded()).then_some(self.item.file_size)
    }

    /// Body length of the response. Unknown for transcoded output.
    pub fn content_length(&self) -> Option<u64> {
        self.total_length().map(|total| self.range.len(total))
    }

    pub fn content_range(&self) -> Option<String> {
        self.total_length().and_then(|total| self.range.content_range(total))
    }

    fn expect(&self, expected: SessionState) -> Result<(), SessionError> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(SessionError::State { actual, expected })
        }
    }

    /// Negotiate the byte range. Transcoded sessions ignore the header.
    pub fn parse_range(&mut self, header: Option<&str>) -> ByteRange {
        self.range = match self.total_length() {
            Some(total) => ByteRange::negotiate(header, total),
            None => ByteRange::Full,
        };
        self.state.send_replace(SessionState::RangeParsed);
        self.range
    }

    /// Open the file at the range start, or spawn the engine. Failures leave
    /// the session Aborted with nothing held open.
    pub async fn open(&mut self, transcoder: &Transcoder) -> Result<(), SessionError> {
        self.expect(SessionState::RangeParsed)?;
        let opened = match &self.representation.engine {
            None => self.open_file().await,
            Some(engine) => {
                let command = EngineCommand::build(
                    engine,
                    &self.item.path,
                    self.representation.audio.as_ref(),
                    self.representation.subtitle.as_ref(),
                    self.start_secs,
                );
                tracing::info!(session = self.id, engine = %engine.id, "transcoding {}", self.item.path.display());
                transcoder
                    .spawn(&command)
                    .map(Source::Pipeline)
                    .map_err(SessionError::from)
            }
        };
        match opened {
            Ok(source) => {
                self.source = Some(source);
                self.state.send_replace(SessionState::SourceOpened);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(SessionState::Aborted);
                Err(e)
            }
        }
    }

    async fn open_file(&self) -> Result<Source, SessionError> {
        let open_err = |source| SessionError::Open {
            path: self.item.path.clone(),
            source,
        };
        let mut file = tokio::fs::File::open(&self.item.path).await.map_err(open_err)?;
        let start = self.range.start();
        if start > 0 {
            file.seek(io::SeekFrom::Start(start)).await.map_err(open_err)?;
        }
        let length = self.range.len(self.item.file_size);
        Ok(Source::File(file.take(length), length))
    }

    /// Start pumping bytes. The returned stream ends when the source is
    /// exhausted; dropping it aborts the session.
    pub fn stream(mut self) -> Result<SessionBody, SessionError> {
        self.expect(SessionState::SourceOpened)?;
        let Some(source) = self.source.take() else {
            return Err(SessionError::State {
                actual: SessionState::Init,
                expected: SessionState::SourceOpened,
            });
        };
        let (reader, pipeline, expected) = match source {
            Source::File(file, length) => (Box::new(file) as ByteSource, None, Some(length)),
            Source::Pipeline(mut pipeline) => match pipeline.take_stdout() {
                Some(stdout) => (Box::new(stdout) as ByteSource, Some(pipeline), None),
                None => {
                    self.state.send_replace(SessionState::Aborted);
                    return Err(PipelineError::NoStdout(pipeline.program().to_string()).into());
                }
            },
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CHUNKS);
        self.state.send_replace(SessionState::Streaming);
        let span = tracing::debug_span!("session", id = self.id, item = %self.item.id);
        tokio::spawn(pump(reader, pipeline, expected, tx, self.state).instrument(span));
        Ok(ReceiverStream::new(rx))
    }
}

/// Copy the source into the channel until EOF, error, or the receiver going away.
async fn pump(
    reader: ByteSource,
    mut pipeline: Option<ProcessPipeline>,
    expected: Option<u64>,
    tx: mpsc::Sender<io::Result<Bytes>>,
    state: watch::Sender<SessionState>,
) {
    let mut chunks = ReaderStream::new(reader);
    let mut sent: u64 = 0;

    let read = loop {
        let next = tokio::select! {
            _ = tx.closed() => break Err("client disconnected".to_string()),
            next = chunks.next() => next,
        };
        match next {
            Some(Ok(bytes)) => {
                sent += bytes.len() as u64;
                if tx.send(Ok(bytes)).await.is_err() {
                    break Err("client disconnected".to_string());
                }
            }
            Some(Err(e)) => {
                let reason = format!("read failed: {}", e);
                let _ = tx.send(Err(e)).await;
                break Err(reason);
            }
            None => break Ok(()),
        }
    };
    drop(chunks);

    let result = match (read, pipeline.as_ref()) {
        (Err(reason), _) => Err(reason),
        (Ok(()), Some(p)) => match p.wait().await {
            PipelineExit::Success => Ok(()),
            exit => {
                let reason = format!("{} ended with {:?}", p.program(), exit);
                let _ = tx.send(Err(io::Error::other(reason.clone()))).await;
                Err(reason)
            }
        },
        (Ok(()), None) => match expected {
            Some(length) if sent < length => {
                let reason = format!("source ended after {} of {} bytes", sent, length);
                let _ = tx.send(Err(io::Error::new(io::ErrorKind::UnexpectedEof, reason.clone()))).await;
                Err(reason)
            }
            _ => Ok(()),
        },
    };

    match result {
        Ok(()) => {
            tracing::debug!(sent, "completed");
            state.send_replace(SessionState::Completed);
        }
        Err(reason) => {
            if let Some(p) = pipeline.as_mut() {
                p.abort();
                p.wait().await;
            }
            tracing::warn!(sent, "aborted: {}", reason);
            state.send_replace(SessionState::Aborted);
        }
    }
}
