//! The outbound playback pacer (§4.5): meters queued PCM into the WebRTC
//! audio source at a steady 10ms/480-sample cadence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use friday_voice_config::PlaybackSettings;
use friday_voice_transport::WebRtcSession;
use parking_lot::Mutex;

struct PlaybackItem {
    samples: Vec<i16>,
    cursor: usize,
}

/// Per-session pacer. Auto-starts its tick task on the first non-empty
/// enqueue and auto-stops once the queue drains (§4.5).
pub struct PlaybackPacer {
    queue: Mutex<VecDeque<PlaybackItem>>,
    running: AtomicBool,
    frame_samples: usize,
    sample_rate: u32,
    tick: Duration,
}

impl PlaybackPacer {
    pub fn new(settings: &PlaybackSettings) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            frame_samples: settings.frame_samples(),
            sample_rate: settings.sample_rate_hz,
            tick: Duration::from_millis(settings.frame_ms as u64),
        })
    }

    /// Queue decoded PCM-16 mono samples at the playback rate (§4.4 step 10).
    pub fn enqueue(self: &Arc<Self>, samples: Vec<i16>, session: Arc<dyn WebRtcSession>) {
        if samples.is_empty() {
            return;
        }
        self.queue.lock().push_back(PlaybackItem { samples, cursor: 0 });
        if !self.running.swap(true, Ordering::SeqCst) {
            let this = self.clone();
            tokio::spawn(async move { this.run(session).await });
        }
    }

    /// Drop all queued audio and prevent the running tick task from
    /// emitting further frames; used by session teardown (§4.2).
    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(self: Arc<Self>, session: Arc<dyn WebRtcSession>) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            interval.tick().await;

            let mut frame = vec![0i16; self.frame_samples];
            let mut filled = 0usize;
            let drained;
            {
                let mut queue = self.queue.lock();
                while filled < self.frame_samples {
                    let Some(item) = queue.front_mut() else { break };
                    let available = item.samples.len() - item.cursor;
                    let take = available.min(self.frame_samples - filled);
                    frame[filled..filled + take]
                        .copy_from_slice(&item.samples[item.cursor..item.cursor + take]);
                    item.cursor += take;
                    filled += take;
                    if item.cursor >= item.samples.len() {
                        queue.pop_front();
                    }
                }
                drained = queue.is_empty();
            }

            if filled == 0 && drained {
                self.running.store(false, Ordering::SeqCst);
                return;
            }

            if let Err(error) = session.push_audio_frame(&frame, self.sample_rate).await {
                tracing::warn!(%error, "playback pacer: audio source rejected frame, stopping");
                self.queue.lock().clear();
                self.running.store(false, Ordering::SeqCst);
                return;
            }

            if drained {
                self.running.store(false, Ordering::SeqCst);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use friday_voice_transport::TransportError;
    use std::sync::atomic::AtomicUsize;

    struct RecordingSession {
        frames: Mutex<Vec<Vec<i16>>>,
        fail_after: Option<usize>,
        pushes: AtomicUsize,
    }

    #[async_trait]
    impl WebRtcSession for RecordingSession {
        async fn accept_offer(&self, _offer_sdp: &str) -> Result<String, TransportError> {
            unimplemented!()
        }
        async fn add_ice_candidate(
            &self,
            _candidate: &str,
            _sdp_mid: Option<&str>,
            _sdp_mline_index: Option<u16>,
        ) -> Result<(), TransportError> {
            unimplemented!()
        }
        async fn push_audio_frame(&self, samples: &[i16], _sample_rate: u32) -> Result<(), TransportError> {
            let n = self.pushes.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_after {
                return Err(TransportError::Media("injected failure".into()));
            }
            self.frames.lock().push(samples.to_vec());
            Ok(())
        }
        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn settings() -> PlaybackSettings {
        PlaybackSettings {
            sample_rate_hz: 48_000,
            frame_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_480_sample_frames_and_zero_pads_tail() {
        let pacer = PlaybackPacer::new(&settings());
        let session = Arc::new(RecordingSession {
            frames: Mutex::new(Vec::new()),
            fail_after: None,
            pushes: AtomicUsize::new(0),
        });
        pacer.enqueue(vec![1; 700], session.clone());

        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        let frames = session.frames.lock();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 480);
        assert_eq!(frames[1].len(), 480);
        assert_eq!(&frames[1][..220], &vec![1i16; 220][..]);
        assert_eq!(&frames[1][220..], &vec![0i16; 260][..]);
    }

    #[tokio::test(start_paused = true)]
    async fn push_failure_clears_queue_and_stops() {
        let pacer = PlaybackPacer::new(&settings());
        let session = Arc::new(RecordingSession {
            frames: Mutex::new(Vec::new()),
            fail_after: Some(1),
            pushes: AtomicUsize::new(0),
        });
        pacer.enqueue(vec![1; 2_000], session.clone());

        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;

        assert!(!pacer.is_running());
        assert!(pacer.queue.lock().is_empty());
    }
}
