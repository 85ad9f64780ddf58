//! Push-to-talk: capture while the button is held, play what others say.
//!
//! Audio devices sit behind [`AudioCapture`] and [`AudioPlayback`]. Device
//! failures surface as [`AudioError`] and only disable voice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};
use walkie_common::{AudioError, AudioFrame, ClientEvent, ServerEvent, WalkieError};

use crate::transport::Transport;

/// Called with each captured block of mono samples in `[-1.0, 1.0]`.
pub type BlockCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// A microphone.
pub trait AudioCapture: Send {
    fn sample_rate(&self) -> u32;

    /// Start delivering blocks to `on_block` until the returned stream is
    /// closed.
    fn open(&mut self, on_block: BlockCallback) -> Result<Box<dyn CaptureStream>, AudioError>;
}

/// A running capture. Closing is immediate; no block is delivered after
/// `close` returns.
pub trait CaptureStream: Send {
    fn close(&mut self);
}

/// A speaker.
pub trait AudioPlayback: Send {
    fn play(&mut self, block: ScheduledBlock);
}

// ---------------------------------------------------------------------------
// Playback scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBlock {
    pub start_at: Instant,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Lines relayed blocks up back to back so network jitter does not leave
/// gaps or overlaps.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: Option<Instant>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, frame: &AudioFrame, now: Instant) -> ScheduledBlock {
        let start_at = match self.next_start {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_start = Some(start_at + Duration::from_secs_f64(frame.duration_secs()));
        ScheduledBlock {
            start_at,
            sample_rate: frame.sample_rate,
            samples: frame.samples(),
        }
    }

    pub fn reset(&mut self) {
        self.next_start = None;
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PttStart {
    Started,
    /// Already transmitting, or someone else holds the channel.
    Ignored,
}

pub struct PttController {
    name: String,
    transport: Arc<dyn Transport>,
    capture: Option<Box<dyn AudioCapture>>,
    stream: Option<Box<dyn CaptureStream>>,
    current_speaker: Option<String>,
    busy_until: Option<Instant>,
    busy_indicator: Duration,
    playback: PlaybackScheduler,
}

impl PttController {
    /// `capture` is `None` when no microphone is available.
    pub fn new(
        name: &str,
        transport: Arc<dyn Transport>,
        capture: Option<Box<dyn AudioCapture>>,
        busy_indicator: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            transport,
            capture,
            stream: None,
            current_speaker: None,
            busy_until: None,
            busy_indicator,
            playback: PlaybackScheduler::new(),
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn is_transmitting(&self) -> bool {
        self.stream.is_some()
    }

    pub fn current_speaker(&self) -> Option<&str> {
        self.current_speaker.as_deref()
    }

    /// Whether the "channel busy, try again" hint should still show.
    pub fn is_busy(&self, now: Instant) -> bool {
        self.busy_until.is_some_and(|until| now < until)
    }

    /// Press: open the microphone and ask for the channel.
    pub async fn start(&mut self) -> Result<PttStart, WalkieError> {
        if self.is_transmitting() {
            return Ok(PttStart::Ignored);
        }
        if let Some(speaker) = &self.current_speaker {
            debug!(speaker = %speaker, "Channel held, not starting");
            return Ok(PttStart::Ignored);
        }

        let capture = self.capture.as_mut().ok_or(AudioError::NoDevice)?;
        let rate = capture.sample_rate();
        let transport = Arc::clone(&self.transport);
        let on_block: BlockCallback = Box::new(move |samples| {
            let frame = AudioFrame::from_samples(rate, samples);
            if let Err(e) = transport.try_emit_audio(frame) {
                trace!(error = %e, "Dropping captured block");
            }
        });

        let mut stream = match capture.open(on_block) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Microphone unavailable, voice disabled for this press");
                return Err(e.into());
            }
        };

        let request = ClientEvent::StartVoiceTransmission(self.name.clone());
        if let Err(e) = self.transport.emit(request).await {
            stream.close();
            return Err(e.into());
        }
        self.stream = Some(stream);
        info!(user = %self.name, "Push-to-talk pressed");
        Ok(PttStart::Started)
    }

    /// Release: stop capturing and give the channel back.
    pub async fn stop(&mut self) -> Result<bool, WalkieError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(false);
        };
        stream.close();
        info!(user = %self.name, "Push-to-talk released");
        self.transport
            .emit(ClientEvent::StopVoiceTransmission)
            .await?;
        Ok(true)
    }

    pub fn on_server_event(&mut self, event: &ServerEvent, now: Instant) {
        match event {
            ServerEvent::VoiceTransmissionStarted(speaker) => {
                self.current_speaker = Some(speaker.username.clone());
                self.busy_until = None;
                self.playback.reset();
                if speaker.username != self.name {
                    self.cancel_capture("channel granted to someone else");
                }
            }
            ServerEvent::VoiceTransmissionEnded(_) => {
                self.current_speaker = None;
                self.busy_until = None;
            }
            ServerEvent::VoiceChannelBusy(busy) => {
                self.busy_until = Some(now + self.busy_indicator);
                self.current_speaker = Some(busy.current_speaker.clone());
                self.cancel_capture("channel busy");
            }
            _ => {}
        }
    }

    /// The server releases our grant when the socket drops, so local state
    /// goes back to idle too.
    pub fn on_disconnected(&mut self) {
        self.cancel_capture("disconnected");
        self.current_speaker = None;
        self.busy_until = None;
        self.playback.reset();
    }

    /// Schedule a relayed block for playback.
    pub fn on_audio(&mut self, frame: &AudioFrame, now: Instant) -> ScheduledBlock {
        self.playback.schedule(frame, now)
    }

    /// Drop the local capture without telling the server; we never held the
    /// channel.
    fn cancel_capture(&mut self, reason: &str) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            debug!(reason, "Capture cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::transport::testing::RecordingTransport;
    use walkie_common::{BusyPayload, SpeakerPayload};

    /// Capture double: hands the callback back to the test so blocks can be
    /// pushed by hand.
    struct FakeCapture {
        deny: bool,
        callback: Arc<Mutex<Option<BlockCallback>>>,
        closed: Arc<AtomicBool>,
    }

    struct FakeStream {
        callback: Arc<Mutex<Option<BlockCallback>>>,
        closed: Arc<AtomicBool>,
    }

    impl AudioCapture for FakeCapture {
        fn sample_rate(&self) -> u32 {
            24_000
        }

        fn open(&mut self, on_block: BlockCallback) -> Result<Box<dyn CaptureStream>, AudioError> {
            if self.deny {
                return Err(AudioError::PermissionDenied("denied".into()));
            }
            self.closed.store(false, Ordering::SeqCst);
            *self.callback.lock().unwrap() = Some(on_block);
            Ok(Box::new(FakeStream {
                callback: Arc::clone(&self.callback),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    impl CaptureStream for FakeStream {
        fn close(&mut self) {
            self.callback.lock().unwrap().take();
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Rig {
        transport: Arc<RecordingTransport>,
        callback: Arc<Mutex<Option<BlockCallback>>>,
        closed: Arc<AtomicBool>,
        ptt: PttController,
    }

    fn rig(deny: bool) -> Rig {
        let transport = Arc::new(RecordingTransport::online());
        let callback = Arc::new(Mutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));
        let capture = FakeCapture {
            deny,
            callback: Arc::clone(&callback),
            closed: Arc::clone(&closed),
        };
        let ptt = PttController::new(
            "A",
            transport.clone(),
            Some(Box::new(capture)),
            Duration::from_secs(2),
        );
        Rig {
            transport,
            callback,
            closed,
            ptt,
        }
    }

    fn push_block(rig: &Rig, samples: &[f32]) {
        if let Some(cb) = rig.callback.lock().unwrap().as_mut() {
            cb(samples);
        }
    }

    fn started(name: &str) -> ServerEvent {
        ServerEvent::VoiceTransmissionStarted(SpeakerPayload {
            username: name.into(),
        })
    }

    #[tokio::test]
    async fn press_requests_channel_and_streams_pcm() {
        let mut rig = rig(false);
        assert_eq!(rig.ptt.start().await.unwrap(), PttStart::Started);
        assert_eq!(
            rig.transport.events(),
            vec![ClientEvent::StartVoiceTransmission("A".into())]
        );

        push_block(&rig, &[0.0, 1.0]);
        let audio = rig.transport.audio.lock().unwrap().clone();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].sample_rate, 24_000);
        assert_eq!(audio[0].sample_count(), 2);
    }

    #[tokio::test]
    async fn second_press_is_ignored() {
        let mut rig = rig(false);
        rig.ptt.start().await.unwrap();
        assert_eq!(rig.ptt.start().await.unwrap(), PttStart::Ignored);
        assert_eq!(rig.transport.events().len(), 1);
    }

    #[tokio::test]
    async fn release_closes_capture_then_stops() {
        let mut rig = rig(false);
        rig.ptt.start().await.unwrap();
        assert!(rig.ptt.stop().await.unwrap());
        assert!(rig.closed.load(Ordering::SeqCst));

        push_block(&rig, &[0.5]);
        assert!(rig.transport.audio.lock().unwrap().is_empty());
        assert_eq!(
            rig.transport.events().last(),
            Some(&ClientEvent::StopVoiceTransmission)
        );

        assert!(!rig.ptt.stop().await.unwrap());
    }

    #[tokio::test]
    async fn denied_microphone_emits_nothing() {
        let mut rig = rig(true);
        let err = rig.ptt.start().await.unwrap_err();
        assert!(matches!(err, WalkieError::Audio(AudioError::PermissionDenied(_))));
        assert!(rig.transport.events().is_empty());
        assert!(!rig.ptt.is_transmitting());
    }

    #[tokio::test]
    async fn no_device_is_reported() {
        let transport = Arc::new(RecordingTransport::online());
        let mut ptt = PttController::new("A", transport.clone(), None, Duration::from_secs(2));
        assert!(matches!(
            ptt.start().await,
            Err(WalkieError::Audio(AudioError::NoDevice))
        ));
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn press_ignored_while_someone_else_talks() {
        let mut rig = rig(false);
        rig.ptt.on_server_event(&started("B"), Instant::now());
        assert_eq!(rig.ptt.start().await.unwrap(), PttStart::Ignored);
        assert!(rig.transport.events().is_empty());

        rig.ptt.on_server_event(
            &ServerEvent::VoiceTransmissionEnded(SpeakerPayload {
                username: "B".into(),
            }),
            Instant::now(),
        );
        assert_eq!(rig.ptt.start().await.unwrap(), PttStart::Started);
    }

    #[tokio::test]
    async fn lost_race_cancels_capture() {
        let mut rig = rig(false);
        rig.ptt.start().await.unwrap();
        rig.ptt.on_server_event(&started("B"), Instant::now());
        assert!(!rig.ptt.is_transmitting());
        assert!(rig.closed.load(Ordering::SeqCst));
        assert_eq!(rig.ptt.current_speaker(), Some("B"));
    }

    #[tokio::test]
    async fn own_grant_keeps_capture() {
        let mut rig = rig(false);
        rig.ptt.start().await.unwrap();
        rig.ptt.on_server_event(&started("A"), Instant::now());
        assert!(rig.ptt.is_transmitting());
    }

    #[tokio::test]
    async fn busy_hint_expires() {
        let mut rig = rig(false);
        rig.ptt.start().await.unwrap();
        let now = Instant::now();
        rig.ptt.on_server_event(
            &ServerEvent::VoiceChannelBusy(BusyPayload {
                current_speaker: "B".into(),
            }),
            now,
        );
        assert!(!rig.ptt.is_transmitting());
        assert!(rig.ptt.is_busy(now + Duration::from_millis(1999)));
        assert!(!rig.ptt.is_busy(now + Duration::from_secs(2)));
    }

    #[test]
    fn playback_blocks_play_back_to_back() {
        let mut sched = PlaybackScheduler::new();
        let t0 = Instant::now();
        // 2400 samples at 24 kHz = 100 ms
        let frame = AudioFrame::new(24_000, vec![0; 4800]);

        let a = sched.schedule(&frame, t0);
        assert_eq!(a.start_at, t0);

        let b = sched.schedule(&frame, t0 + Duration::from_millis(10));
        assert_eq!(b.start_at, t0 + Duration::from_millis(100));

        // Late arrival starts now instead of in the past.
        let late = t0 + Duration::from_millis(500);
        let c = sched.schedule(&frame, late);
        assert_eq!(c.start_at, late);

        sched.reset();
        let d = sched.schedule(&frame, t0 + Duration::from_millis(501));
        assert_eq!(d.start_at, t0 + Duration::from_millis(501));
    }
}
