//! Poll loop and command scenarios against an in-memory backend
//!
//! Tests run on a paused tokio clock so timers fire deterministically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pmowall::model::{CommandResponse, EnqueueRequest, QueueResponse, VolumeResponse};
use pmowall::{
    AnimationMode, ColorMode, DisplayMode, LockState, PollOutcome, PollPhase, QueueableVideo,
    Result, ScreenConfig, ScreenRect, SessionConfig, SessionEvent, TvId, WallBackend, WallError,
    WallLayout, WallSession,
};
use serde_json::{Value, json};
use tokio::time::{sleep, timeout};

#[derive(Clone, Debug, PartialEq)]
enum Call {
    Skip(i64),
    Remove(i64),
    SetVolPct(u8),
    Clear,
    Enqueue { title: String, color_mode: String },
    DisplayMode(BTreeMap<TvId, DisplayMode>),
    AnimationMode(AnimationMode),
    Screensaver(bool),
}

struct ScriptedBackend {
    queue: Mutex<Value>,
    fail_queue: AtomicBool,
    reject_commands: AtomicBool,
    fetch_delay: Mutex<Duration>,
    command_delay: Mutex<Duration>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    fn new(queue: Value) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(queue),
            fail_queue: AtomicBool::new(false),
            reject_commands: AtomicBool::new(false),
            fetch_delay: Mutex::new(Duration::ZERO),
            command_delay: Mutex::new(Duration::ZERO),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn set_queue(&self, body: Value) {
        *self.queue.lock().unwrap() = body;
    }

    fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    fn set_command_delay(&self, delay: Duration) {
        *self.command_delay.lock().unwrap() = delay;
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn command(&self, call: Call) -> Result<CommandResponse> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.command_delay.lock().unwrap();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        Ok(CommandResponse {
            success: !self.reject_commands.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl WallBackend for ScriptedBackend {
    async fn get_queue(&self) -> Result<QueueResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_queue.load(Ordering::SeqCst) {
            return Err(WallError::Status {
                endpoint: "/queue".to_string(),
                status: 503,
            });
        }
        let body = self.queue.lock().unwrap().clone();
        Ok(serde_json::from_value(body)?)
    }

    async fn get_vol_pct(&self) -> Result<VolumeResponse> {
        let vol_pct = self.queue.lock().unwrap()["vol_pct"].as_f64();
        Ok(VolumeResponse {
            success: true,
            vol_pct,
        })
    }

    async fn skip(&self, playlist_video_id: i64) -> Result<CommandResponse> {
        self.command(Call::Skip(playlist_video_id)).await
    }

    async fn remove(&self, playlist_video_id: i64) -> Result<CommandResponse> {
        self.command(Call::Remove(playlist_video_id)).await
    }

    async fn set_vol_pct(&self, vol_pct: u8) -> Result<CommandResponse> {
        self.command(Call::SetVolPct(vol_pct)).await
    }

    async fn clear(&self) -> Result<CommandResponse> {
        self.command(Call::Clear).await
    }

    async fn enqueue(&self, request: &EnqueueRequest) -> Result<CommandResponse> {
        self.command(Call::Enqueue {
            title: request.title.clone(),
            color_mode: request.color_mode.0.clone(),
        })
        .await
    }

    async fn set_display_mode(
        &self,
        modes: &BTreeMap<TvId, DisplayMode>,
    ) -> Result<CommandResponse> {
        self.command(Call::DisplayMode(modes.clone())).await
    }

    async fn set_animation_mode(&self, mode: &AnimationMode) -> Result<CommandResponse> {
        self.command(Call::AnimationMode(mode.clone())).await
    }

    async fn set_screensaver_enabled(&self, enabled: bool) -> Result<CommandResponse> {
        self.command(Call::Screensaver(enabled)).await
    }
}

fn queue_body(playing: Option<i64>, queued: &[i64], vol_pct: f64, animation_mode: &str) -> Value {
    let mut queue: Vec<Value> = playing
        .into_iter()
        .map(|id| json!({"playlist_video_id": id, "title": format!("video {}", id), "status": "STATUS_PLAYING"}))
        .collect();
    queue.extend(queued.iter().map(|id| {
        json!({"playlist_video_id": id, "title": format!("video {}", id), "status": "STATUS_QUEUED"})
    }));
    json!({
        "success": true,
        "queue": queue,
        "vol_pct": vol_pct,
        "is_screensaver_enabled": true,
        "tv_settings": {},
        "animation_mode": animation_mode
    })
}

fn two_screen_layout() -> WallLayout {
    WallLayout::from_screens(vec![
        ScreenConfig::new("piwall1.local_1", ScreenRect::new(0.0, 0.0, 10.0, 10.0)),
        ScreenConfig::new("piwall2.local_1", ScreenRect::new(10.0, 0.0, 10.0, 10.0)),
    ])
    .unwrap()
}

fn session_with(backend: &Arc<ScriptedBackend>) -> WallSession {
    WallSession::new(
        backend.clone(),
        two_screen_layout(),
        SessionConfig {
            poll_interval: Duration::from_secs(1),
            volume_lock_margin: Duration::from_millis(500),
            ..SessionConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_playing_entry_is_lifted_out_of_queue() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[9], 50.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);
    let events = session.subscribe();

    assert_eq!(session.reconciler().poll_once().await, PollOutcome::Merged);

    let snapshot = session.snapshot();
    assert_eq!(
        snapshot.playlist_current_video.unwrap().playlist_video_id,
        7
    );
    let queued: Vec<i64> = snapshot
        .playlist_videos
        .iter()
        .map(|entry| entry.playlist_video_id)
        .collect();
    assert_eq!(queued, vec![9]);
    assert_eq!(snapshot.vol_pct, Some(50));

    let first = events.try_recv().unwrap();
    assert!(matches!(first, SessionEvent::QueueChanged { current: Some(_), .. }));
}

#[tokio::test(start_paused = true)]
async fn test_loop_reschedules_every_interval() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 10.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);

    assert_eq!(session.reconciler().phase(), PollPhase::Idle);
    session.start();
    sleep(Duration::from_millis(3500)).await;

    // t = 0, 1, 2, 3
    assert_eq!(backend.fetches(), 4);
    assert_eq!(session.reconciler().phase(), PollPhase::Scheduled);

    session.shutdown();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.fetches(), 4);
    assert_eq!(session.reconciler().phase(), PollPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_never_two_fetches_in_flight() {
    let backend = ScriptedBackend::new(queue_body(Some(1), &[], 10.0, "ANIMATION_MODE_NONE"));
    backend.set_fetch_delay(Duration::from_secs(5));
    let session = session_with(&backend);

    session.start();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(session.reconciler().phase(), PollPhase::Fetching);

    // timer firing early while the slow fetch is pending
    session.reconciler().poll_now();
    assert_eq!(session.reconciler().poll_once().await, PollOutcome::Skipped);
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(backend.fetches(), 1);

    sleep(Duration::from_secs(10)).await;
    assert!(backend.fetches() >= 2);
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_poll_failures_are_absorbed() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[9], 10.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);
    assert_eq!(session.reconciler().poll_once().await, PollOutcome::Merged);

    backend.fail_queue.store(true, Ordering::SeqCst);
    assert_eq!(session.reconciler().poll_once().await, PollOutcome::Failed);
    assert_eq!(session.reconciler().consecutive_failures(), 1);

    // state does not advance, nothing is cleared
    let snapshot = session.snapshot();
    assert_eq!(snapshot.playlist_current_video.unwrap().playlist_video_id, 7);

    session.start();
    sleep(Duration::from_millis(2500)).await;
    assert!(session.reconciler().is_running());
    assert_eq!(backend.fetches(), 5);

    backend.fail_queue.store(false, Ordering::SeqCst);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(session.reconciler().consecutive_failures(), 0);
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_no_data_response_keeps_state() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[], 10.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);
    session.reconciler().poll_once().await;

    backend.set_queue(json!({}));
    assert_eq!(session.reconciler().poll_once().await, PollOutcome::NoData);
    assert!(session.snapshot().playlist_current_video.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_volume_lock_blocks_stale_poll() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);
    session.reconciler().poll_once().await;
    assert_eq!(session.snapshot().vol_pct, Some(20));

    session.commands().begin_volume_change();
    session.commands().set_vol_pct(80).await.unwrap();
    assert_eq!(session.reconciler().poll_once().await, PollOutcome::Merged);
    assert_eq!(session.snapshot().vol_pct, Some(80));
    assert_eq!(session.snapshot().volume_lock_state(), LockState::Locked);

    session.commands().end_volume_change();
    backend.set_queue(queue_body(None, &[], 80.0, "ANIMATION_MODE_NONE"));
    session.reconciler().poll_once().await;
    assert_eq!(session.snapshot().vol_pct, Some(80));
    assert_eq!(session.snapshot().volume_lock_state(), LockState::Unlocked);

    assert_eq!(backend.calls(), vec![Call::SetVolPct(80)]);
}

#[tokio::test(start_paused = true)]
async fn test_releasable_volume_lets_exactly_one_poll_through() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);

    session.commands().begin_volume_change();
    session.commands().end_volume_change();
    session.reconciler().poll_once().await;

    assert_eq!(session.snapshot().vol_pct, Some(20));
    assert_eq!(session.snapshot().volume_lock_state(), LockState::Unlocked);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_poll_cannot_release_new_drag() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    backend.set_fetch_delay(Duration::from_millis(100));
    let session = session_with(&backend);

    session.commands().begin_volume_change();
    session.commands().end_volume_change();

    let (outcome, ()) = tokio::join!(session.reconciler().poll_once(), async {
        sleep(Duration::from_millis(10)).await;
        // a new drag starts while the poll is in flight
        session.commands().begin_volume_change();
    });

    assert_eq!(outcome, PollOutcome::Merged);
    assert_eq!(session.snapshot().vol_pct, None);
    assert_eq!(session.snapshot().volume_lock_state(), LockState::Locked);
}

#[tokio::test(start_paused = true)]
async fn test_animation_mode_survives_stale_poll() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    backend.set_fetch_delay(Duration::from_millis(100));
    backend.set_command_delay(Duration::from_millis(50));
    let session = session_with(&backend);

    let (outcome, result) = tokio::join!(session.reconciler().poll_once(), async {
        sleep(Duration::from_millis(10)).await;
        session
            .commands()
            .set_animation_mode(AnimationMode::Spiral)
            .await
    });
    result.unwrap();

    // the poll was dispatched before the command and reports the old mode
    assert_eq!(outcome, PollOutcome::Merged);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.animation_mode, AnimationMode::Spiral);
    assert!(matches!(
        snapshot.animation_lock_state(),
        LockState::ReleasablePendingOneCycle { .. }
    ));

    backend.set_fetch_delay(Duration::ZERO);
    backend.set_queue(queue_body(None, &[], 20.0, "ANIMATION_MODE_SPIRAL"));
    session.reconciler().poll_once().await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.animation_mode, AnimationMode::Spiral);
    assert_eq!(snapshot.animation_lock_state(), LockState::Unlocked);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_animation_mode() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_TILE_REPEAT"));
    let session = session_with(&backend);
    session.reconciler().poll_once().await;

    let sent = session
        .commands()
        .toggle_animation_mode(AnimationMode::TileRepeat)
        .await
        .unwrap();
    assert_eq!(sent, AnimationMode::None);

    let sent = session
        .commands()
        .toggle_animation_mode(AnimationMode::Spiral)
        .await
        .unwrap();
    assert_eq!(sent, AnimationMode::Spiral);

    assert_eq!(
        backend.calls(),
        vec![
            Call::AnimationMode(AnimationMode::None),
            Call::AnimationMode(AnimationMode::Spiral)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_skip_sends_the_entry_the_user_saw() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[9], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);
    session.reconciler().poll_once().await;

    backend.set_fetch_delay(Duration::from_millis(100));
    backend.set_command_delay(Duration::from_millis(200));

    let (outcome, skipped) = tokio::join!(session.reconciler().poll_once(), async {
        sleep(Duration::from_millis(10)).await;
        // the backend moves on before the click is processed
        backend.set_queue(queue_body(Some(9), &[], 20.0, "ANIMATION_MODE_NONE"));
        session.commands().skip().await
    });

    assert!(skipped.unwrap());
    assert_eq!(outcome, PollOutcome::Merged);
    assert_eq!(backend.calls(), vec![Call::Skip(7)]);
    assert_eq!(
        session
            .snapshot()
            .playlist_current_video
            .unwrap()
            .playlist_video_id,
        9
    );
}

#[tokio::test(start_paused = true)]
async fn test_skip_without_playing_entry() {
    let backend = ScriptedBackend::new(queue_body(None, &[9], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);
    session.reconciler().poll_once().await;

    assert!(!session.commands().skip().await.unwrap());
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_skip_resumes_polling_after_one_interval() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);
    session.start();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.fetches(), 1);

    session.commands().skip().await.unwrap();
    sleep(Duration::from_millis(900)).await;
    // the pending timer was cancelled and nothing fired yet
    assert_eq!(backend.fetches(), 1);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.fetches(), 2);
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_commands_suspend_and_resume_polling() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[9], 20.0, "ANIMATION_MODE_NONE"));
    backend.set_command_delay(Duration::from_secs(3));
    let session = session_with(&backend);
    session.start();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.fetches(), 1);

    let ((), ()) = tokio::join!(
        async {
            session.commands().remove(9).await.unwrap();
        },
        async {
            sleep(Duration::from_millis(2000)).await;
            assert!(session.reconciler().is_suspended());
            assert_eq!(backend.fetches(), 1);
        }
    );

    // resumed immediately on completion
    sleep(Duration::from_millis(10)).await;
    assert!(!session.reconciler().is_suspended());
    assert_eq!(backend.fetches(), 2);
    assert_eq!(backend.calls(), vec![Call::Remove(9)]);
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_display_mode_loading_lifecycle() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    backend.set_command_delay(Duration::from_millis(100));
    let session = session_with(&backend);
    let tv = TvId::from("piwall2.local_1");

    let modes = BTreeMap::from([(tv.clone(), DisplayMode::Repeat)]);
    let (result, ()) = tokio::join!(session.commands().set_display_mode(modes), async {
        sleep(Duration::from_millis(50)).await;
        let snapshot = session.snapshot();
        assert!(snapshot.screens.get(&tv).unwrap().is_loading());
    });
    result.unwrap();

    let snapshot = session.snapshot();
    let screen = snapshot.screens.get(&tv).unwrap();
    assert!(!screen.is_loading());
    assert_eq!(screen.display_mode(), DisplayMode::Repeat);
}

#[tokio::test(start_paused = true)]
async fn test_display_mode_failure_clears_loading() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    backend.reject_commands.store(true, Ordering::SeqCst);
    let session = session_with(&backend);
    let tv = TvId::from("piwall1.local_1");

    let result = session
        .commands()
        .set_display_mode(BTreeMap::from([(tv.clone(), DisplayMode::Repeat)]))
        .await;
    assert!(matches!(result, Err(WallError::Rejected(_))));

    let snapshot = session.snapshot();
    let screen = snapshot.screens.get(&tv).unwrap();
    assert!(!screen.is_loading());
    assert_eq!(screen.display_mode(), DisplayMode::Tile);
}

#[tokio::test(start_paused = true)]
async fn test_display_mode_unknown_screen() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);

    let result = session
        .commands()
        .set_display_mode(BTreeMap::from([(TvId::from("nope"), DisplayMode::Tile)]))
        .await;
    assert!(matches!(result, Err(WallError::UnknownScreen(_))));
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_display_mode_all() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);

    session
        .commands()
        .set_display_mode_all(DisplayMode::Repeat)
        .await
        .unwrap();

    assert_eq!(
        backend.calls(),
        vec![Call::DisplayMode(BTreeMap::from([
            (TvId::from("piwall1.local_1"), DisplayMode::Repeat),
            (TvId::from("piwall2.local_1"), DisplayMode::Repeat),
        ]))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_records_recent_video() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);
    let events = session.subscribe();

    let video = QueueableVideo {
        video_url: "https://www.youtube.com/watch?v=abc".to_string(),
        thumbnail: "https://i.ytimg.com/vi/abc/mqdefault.jpg".to_string(),
        title: "abc".to_string(),
        duration: "1:00".to_string(),
    };
    session.commands().enqueue(video.clone(), None).await.unwrap();
    session
        .commands()
        .enqueue(video, Some(ColorMode("bw".to_string())))
        .await
        .unwrap();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.last_queued.len(), 2);
    assert_eq!(snapshot.last_queued[0].color_mode, ColorMode::default());
    assert_eq!(snapshot.last_queued[1].color_mode.0, "bw");

    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::VideoQueued {
            title: "abc".to_string(),
            color_mode: ColorMode::default()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_enqueue_is_not_recorded() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 20.0, "ANIMATION_MODE_NONE"));
    backend.reject_commands.store(true, Ordering::SeqCst);
    let session = session_with(&backend);

    let video = QueueableVideo {
        video_url: "https://www.youtube.com/watch?v=abc".to_string(),
        thumbnail: String::new(),
        title: "abc".to_string(),
        duration: "1:00".to_string(),
    };
    assert!(session.commands().enqueue(video, None).await.is_err());
    assert!(session.snapshot().last_queued.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_screensaver_and_clear() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[], 20.0, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);

    session.commands().set_screensaver_enabled(false).await.unwrap();
    assert!(!session.snapshot().is_screensaver_enabled);

    session.commands().clear().await.unwrap();
    assert_eq!(backend.calls(), vec![Call::Screensaver(false), Call::Clear]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_vol_pct_respects_lock() {
    let backend = ScriptedBackend::new(queue_body(None, &[], 33.3, "ANIMATION_MODE_NONE"));
    let session = session_with(&backend);

    assert_eq!(session.reconciler().refresh_vol_pct().await.unwrap(), Some(33));

    session.commands().begin_volume_change();
    backend.set_queue(queue_body(None, &[], 90.0, "ANIMATION_MODE_NONE"));
    assert_eq!(session.reconciler().refresh_vol_pct().await.unwrap(), Some(33));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_commands_release_optimistic_state() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[], 10.0, "ANIMATION_MODE_NONE"));
    backend.set_command_delay(Duration::from_secs(60));
    let session = session_with(&backend);
    session.reconciler().poll_once().await;
    let tv = TvId::from("piwall1.local_1");

    let commands = session.commands();
    assert!(
        timeout(Duration::from_secs(1), commands.set_animation_mode(AnimationMode::Spiral))
            .await
            .is_err()
    );
    assert!(
        timeout(
            Duration::from_secs(1),
            commands.set_display_mode(BTreeMap::from([(tv.clone(), DisplayMode::Repeat)]))
        )
        .await
        .is_err()
    );
    assert!(
        timeout(Duration::from_secs(1), commands.set_vol_pct(90))
            .await
            .is_err()
    );

    let snapshot = session.snapshot();
    assert!(!snapshot.screens.get(&tv).unwrap().is_loading());
    assert!(matches!(
        snapshot.animation_lock_state(),
        LockState::ReleasablePendingOneCycle { .. }
    ));
    assert!(matches!(
        snapshot.volume_lock_state(),
        LockState::ReleasablePendingOneCycle { .. }
    ));
    assert!(!session.reconciler().is_suspended());

    // the backend never applied any of them: the next poll wins
    assert_eq!(session.reconciler().poll_once().await, PollOutcome::Merged);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.animation_mode, AnimationMode::None);
    assert_eq!(snapshot.animation_lock_state(), LockState::Unlocked);
    assert_eq!(snapshot.vol_pct, Some(10));
    assert_eq!(snapshot.volume_lock_state(), LockState::Unlocked);
    assert_eq!(
        snapshot.screens.get(&tv).unwrap().display_mode(),
        DisplayMode::Tile
    );
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_commands_resume_after_longest_delay() {
    let backend = ScriptedBackend::new(queue_body(Some(7), &[9], 20.0, "ANIMATION_MODE_NONE"));
    backend.set_command_delay(Duration::from_millis(100));
    let session = session_with(&backend);
    session.start();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.fetches(), 1);

    // skip finishes first, remove releases the last suspension
    let (skipped, removed) = tokio::join!(session.commands().skip(), async {
        sleep(Duration::from_millis(10)).await;
        session.commands().remove(9).await
    });
    assert!(skipped.unwrap());
    removed.unwrap();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.fetches(), 1);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(backend.fetches(), 2);
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_null_titles_do_not_break_polling() {
    let backend = ScriptedBackend::new(json!({
        "success": true,
        "queue": [
            {"playlist_video_id": 7, "title": "ok", "status": "STATUS_PLAYING"},
            {"playlist_video_id": 9, "title": null, "thumbnail": null, "url": null, "status": "STATUS_QUEUED"}
        ],
        "vol_pct": 40.0
    }));
    let session = session_with(&backend);

    assert_eq!(session.reconciler().poll_once().await, PollOutcome::Merged);
    let snapshot = session.snapshot();
    assert_eq!(
        snapshot.playlist_current_video.unwrap().playlist_video_id,
        7
    );
    assert_eq!(snapshot.playlist_videos[0].title, "");
    assert_eq!(snapshot.vol_pct, Some(40));
}
