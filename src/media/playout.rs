//! File-backed playout: the relay's default [`Session`].
//!
//! A session streams a raw PCM file. A pump task reads the file in chunks,
//! reassembles them into frames of the call's `buffer_length` through a
//! [`FrameBuffer`], and releases one frame per frame-duration at the
//! configured byte rate. Frames go to an optional tap (the encoder side).

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    fs::File,
    io::AsyncReadExt,
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::{
    config::Config,
    error::SessionError,
    media::frame_buffer::FrameBuffer,
    net::outbound::Outbound,
    protocol::{message::Message, request::ChatId},
    session::{JoinParams, LeaveOutcome, Session, SessionFactory, StreamParams},
};

/// Receives every frame a session plays.
pub type FrameTap = mpsc::Sender<Vec<u8>>;

pub struct FilePlayoutFactory {
    config: Arc<Config>,
    outbound: Arc<dyn Outbound>,
    tap: Option<FrameTap>,
}

impl FilePlayoutFactory {
    pub fn new(config: Arc<Config>, outbound: Arc<dyn Outbound>) -> Self {
        Self { config, outbound, tap: None }
    }

    #[cfg(test)]
    pub fn with_tap(mut self, tap: FrameTap) -> Self {
        self.tap = Some(tap);
        self
    }
}

#[async_trait]
impl SessionFactory for FilePlayoutFactory {
    async fn create(
        &self,
        chat_id: ChatId,
        params: JoinParams,
    ) -> Result<Arc<dyn Session>, SessionError> {
        let source = media_path(&params.stream).ok_or(SessionError::NoMediaSource)?;
        let frame_size = params
            .buffer_length
            .and_then(NonZeroUsize::new)
            .unwrap_or(self.config.default_frame_size);

        tracing::debug!(
            chat_id,
            source = %source.display(),
            frame_size = frame_size.get(),
            invite = params.invite_hash.is_some(),
            lip_sync = params.stream.lip_sync,
            "Creating playout session"
        );
        Ok(Arc::new(FilePlayout {
            chat_id,
            frame_size,
            config: Arc::clone(&self.config),
            outbound: Arc::clone(&self.outbound),
            tap: self.tap.clone(),
            clock: Arc::new(Clock::default()),
            inner: Mutex::new(Inner { source, pump: None }),
        }))
    }
}

pub struct FilePlayout {
    chat_id: ChatId,
    frame_size: NonZeroUsize,
    config: Arc<Config>,
    outbound: Arc<dyn Outbound>,
    tap: Option<FrameTap>,
    clock: Arc<Clock>,
    inner: Mutex<Inner>,
}

/// State shared with the pump task.
struct Clock {
    muted: AtomicBool,
    paused: watch::Sender<bool>,
    played_bytes: AtomicU64,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            muted: AtomicBool::new(false),
            paused: watch::Sender::new(false),
            played_bytes: AtomicU64::new(0),
        }
    }
}

struct Inner {
    source: PathBuf,
    pump: Option<JoinHandle<()>>,
}

impl Inner {
    fn ensure_playing(&self) -> Result<(), SessionError> {
        match &self.pump {
            None => Err(SessionError::Closed),
            Some(pump) if pump.is_finished() => Err(SessionError::Stream("input exhausted".into())),
            Some(_) => Ok(()),
        }
    }

    /// Stops the pump and waits until it is gone, so no frame is counted
    /// after this returns.
    async fn halt(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            let _ = pump.await;
        }
    }
}

impl FilePlayout {
    async fn start(&self, inner: &mut Inner, source: PathBuf) -> Result<(), SessionError> {
        let file = open_source(&source).await?;
        let pump = Pump {
            chat_id: self.chat_id,
            frame_size: self.frame_size,
            read_chunk: self.config.read_chunk_size,
            frame_interval: self.config.media_duration(self.frame_size.get()),
            clock: Arc::clone(&self.clock),
            outbound: Arc::clone(&self.outbound),
            tap: self.tap.clone(),
        };

        tracing::info!(chat_id = self.chat_id, source = %source.display(), "Playout started");
        inner.pump = Some(tokio::spawn(pump.run(file)));
        inner.source = source;
        Ok(())
    }
}

#[async_trait]
impl Session for FilePlayout {
    async fn join(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.pump.is_some() {
            return Ok(());
        }
        let source = inner.source.clone();
        self.start(&mut inner, source).await
    }

    async fn leave(&self) -> Result<LeaveOutcome, SessionError> {
        self.inner.lock().await.halt().await;
        tracing::debug!(chat_id = self.chat_id, "Playout left");
        Ok(LeaveOutcome::ok())
    }

    async fn stop(&self) {
        self.inner.lock().await.halt().await;
        tracing::debug!(chat_id = self.chat_id, "Playout stopped");
    }

    async fn pause(&self) -> Result<(), SessionError> {
        self.inner.lock().await.ensure_playing()?;
        self.clock.paused.send_replace(true);
        Ok(())
    }

    async fn resume(&self) -> Result<(), SessionError> {
        self.inner.lock().await.ensure_playing()?;
        self.clock.paused.send_replace(false);
        Ok(())
    }

    async fn change_stream(&self, params: StreamParams) -> Result<(), SessionError> {
        let source = media_path(&params).ok_or(SessionError::NoMediaSource)?;
        let mut inner = self.inner.lock().await;

        inner.halt().await;
        self.clock.played_bytes.store(0, Ordering::Relaxed);
        self.start(&mut inner, source).await
    }

    fn mute(&self) {
        self.clock.muted.store(true, Ordering::Relaxed);
    }

    fn unmute(&self) {
        self.clock.muted.store(false, Ordering::Relaxed);
    }

    fn played_time(&self) -> u64 {
        self.clock.played_bytes.load(Ordering::Relaxed) / self.config.bytes_per_second
    }
}

struct Pump {
    chat_id: ChatId,
    frame_size: NonZeroUsize,
    read_chunk: NonZeroUsize,
    frame_interval: Duration,
    clock: Arc<Clock>,
    outbound: Arc<dyn Outbound>,
    tap: Option<FrameTap>,
}

impl Pump {
    async fn run(self, mut file: File) {
        let mut buffer = FrameBuffer::new(self.frame_size);
        let mut paused = self.clock.paused.subscribe();
        // interval() panics on a zero period
        let mut ticker = time::interval(self.frame_interval.max(Duration::from_nanos(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut chunk = vec![0u8; self.read_chunk.get()];
        let mut eof = false;

        loop {
            let running = paused.wait_for(|paused| !*paused).await.is_ok();
            if !running {
                break;
            }
            ticker.tick().await;

            while !eof && buffer.buffered() < buffer.frame_size() {
                match file.read(&mut chunk).await {
                    Ok(0) => eof = true,
                    Ok(n) => buffer.push(chunk[..n].to_vec()),
                    Err(e) => {
                        tracing::warn!(chat_id = self.chat_id, error = %e, "Media read failed");
                        eof = true;
                    }
                }
            }

            // a trailing partial frame is dropped
            let Some(mut frame) = buffer.try_extract_frame() else {
                break;
            };
            if self.clock.muted.load(Ordering::Relaxed) {
                frame.fill(0);
            }
            self.clock.played_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);

            if let Some(tap) = &self.tap {
                if tap.send(frame).await.is_err() {
                    tracing::trace!(chat_id = self.chat_id, "Frame tap closed");
                }
            }
        }

        tracing::info!(chat_id = self.chat_id, dropped = buffer.buffered(), "Stream ended");
        if let Err(e) = self.outbound.send_update(Message::mk_stream_ended(self.chat_id)).await {
            tracing::warn!(chat_id = self.chat_id, error = %e, "Could not report stream end");
        }
    }
}

fn media_path(stream: &StreamParams) -> Option<PathBuf> {
    stream
        .audio
        .as_ref()
        .map(|audio| audio.path.as_str())
        .or_else(|| stream.video.as_ref().map(|video| video.path.as_str()))
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

async fn open_source(path: &Path) -> Result<File, SessionError> {
    File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SessionError::FileNotFound(path.to_path_buf()),
        _ => SessionError::Io(e),
    })
}
