// Integration tests for device acquisition and release
//
// These tests drive a MediaCaptureSession against scripted fakes and check
// that every path lands in a defined state without leaking live tracks.

mod common;

use anyhow::Result;
use common::{drain, Harness, Outcome, PreviewMode};
use practice_capture::device::{DeviceError, FacingMode, MediaConstraints, VideoConstraints};
use practice_capture::session::{
    CaptureErrorKind, CaptureState, SessionConfig, SessionError, SessionEvent,
};
use std::time::Duration;

fn capture_kind(err: &SessionError) -> Option<CaptureErrorKind> {
    match err {
        SessionError::Capture(e) => Some(e.kind),
        _ => None,
    }
}

#[tokio::test]
async fn test_acquire_video_binds_preview() -> Result<()> {
    let h = Harness::new();

    h.session.acquire(MediaConstraints::video_only()).await?;

    assert_eq!(h.session.state(), CaptureState::Live);
    assert!(h.preview.is_attached());
    assert!(h.preview.is_playing());

    // Preview is muted and mirrored by default
    let options = h.preview.options().unwrap();
    assert!(options.muted);
    assert!(options.mirrored);

    let stream = h.session.stream().unwrap();
    assert!(stream.has_video());
    assert!(!stream.has_audio());
    assert!(h.session.last_error().is_none());

    Ok(())
}

#[tokio::test]
async fn test_acquire_audio_only_skips_preview() -> Result<()> {
    let h = Harness::new();

    h.session.acquire(MediaConstraints::audio_only()).await?;

    assert_eq!(h.session.state(), CaptureState::Live);
    assert_eq!(h.preview.attach_count(), 0);
    assert_eq!(h.gateway.live_tracks(), 1);

    Ok(())
}

#[tokio::test]
async fn test_repeated_acquire_never_leaks_tracks() -> Result<()> {
    let h = Harness::new();

    for _ in 0..5 {
        h.session.acquire(MediaConstraints::audio_video()).await?;
        // Only the current handle's two tracks are live
        assert_eq!(h.gateway.live_tracks(), 2);
    }
    assert_eq!(h.gateway.issued_count(), 10);

    h.session.release();
    assert_eq!(h.gateway.live_tracks(), 0);
    assert_eq!(h.session.state(), CaptureState::Idle);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_from_every_state_reaches_idle() -> Result<()> {
    // Idle
    let h = Harness::new();
    h.session.release();
    assert_eq!(h.session.state(), CaptureState::Idle);

    // Live
    let h = Harness::new();
    h.session.acquire(MediaConstraints::audio_video()).await?;
    h.session.release();
    assert_eq!(h.session.state(), CaptureState::Idle);
    assert_eq!(h.gateway.live_tracks(), 0);
    assert!(!h.preview.is_attached());

    // Recording
    let h = Harness::new();
    h.session.acquire(MediaConstraints::audio_video()).await?;
    h.session.start_recording()?;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    h.session.release();
    assert_eq!(h.session.state(), CaptureState::Idle);
    assert_eq!(h.gateway.live_tracks(), 0);

    // Stopped
    let h = Harness::new();
    h.session.acquire(MediaConstraints::audio_video()).await?;
    h.session.start_recording()?;
    h.session.stop_recording().await?;
    assert_eq!(h.session.state(), CaptureState::Stopped);
    h.session.release();
    assert_eq!(h.session.state(), CaptureState::Idle);
    assert_eq!(h.gateway.live_tracks(), 0);

    // Failed
    let h = Harness::new();
    h.gateway
        .push(Outcome::Fail(DeviceError::InUse("zoom".to_string())));
    assert!(h.session.acquire(MediaConstraints::video_only()).await.is_err());
    assert_eq!(h.session.state(), CaptureState::Failed);
    h.session.release();
    assert_eq!(h.session.state(), CaptureState::Idle);
    assert!(h.session.last_error().is_none());

    Ok(())
}

#[tokio::test]
async fn test_release_is_idempotent() -> Result<()> {
    let h = Harness::new();
    h.session.acquire(MediaConstraints::audio_video()).await?;
    let mut events = h.session.subscribe();

    h.session.release();
    h.session.release();

    let transitions: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::StateChanged { .. }))
        .collect();
    assert_eq!(transitions.len(), 1, "second release must not transition");
    assert_eq!(h.session.state(), CaptureState::Idle);
    assert_eq!(h.gateway.live_tracks(), 0);

    Ok(())
}

#[tokio::test]
async fn test_permission_denied_then_retry() -> Result<()> {
    let h = Harness::new();
    h.gateway.push(Outcome::Fail(DeviceError::Denied(
        "user dismissed prompt".to_string(),
    )));

    let err = h
        .session
        .acquire(MediaConstraints::video_only())
        .await
        .unwrap_err();
    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::PermissionDenied));
    assert_eq!(h.session.state(), CaptureState::Failed);

    let last = h.session.last_error().unwrap();
    assert_eq!(last.kind, CaptureErrorKind::PermissionDenied);
    assert!(last.message.contains("Camera permission denied"));
    assert!(!last.retry_hint().is_empty());

    // Nothing is retried automatically
    assert_eq!(h.gateway.request_count(), 1);

    // Explicit retry succeeds and clears the error
    h.session.acquire(MediaConstraints::video_only()).await?;
    assert_eq!(h.session.state(), CaptureState::Live);
    assert!(h.session.last_error().is_none());

    Ok(())
}

#[tokio::test]
async fn test_device_busy_and_not_found_are_classified() -> Result<()> {
    let h = Harness::new();

    h.gateway
        .push(Outcome::Fail(DeviceError::InUse("held".to_string())));
    let err = h
        .session
        .acquire(MediaConstraints::audio_only())
        .await
        .unwrap_err();
    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::DeviceBusy));

    h.gateway
        .push(Outcome::Fail(DeviceError::NotFound("none".to_string())));
    let err = h
        .session
        .acquire(MediaConstraints::audio_only())
        .await
        .unwrap_err();
    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::DeviceNotFound));
    assert!(err.to_string().contains("microphone"));

    h.gateway
        .push(Outcome::Fail(DeviceError::Other("driver exploded".to_string())));
    let err = h
        .session
        .acquire(MediaConstraints::audio_only())
        .await
        .unwrap_err();
    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::Unknown));
    assert!(err.to_string().contains("driver exploded"));

    Ok(())
}

#[tokio::test]
async fn test_overconstrained_retries_once_relaxed() -> Result<()> {
    let h = Harness::new();
    h.gateway.push(Outcome::Fail(DeviceError::Overconstrained(
        "1280x720 unsupported".to_string(),
    )));

    let constraints = MediaConstraints {
        video: Some(VideoConstraints {
            ideal_width: Some(1280),
            ideal_height: Some(720),
            facing_mode: Some(FacingMode::User),
        }),
        audio: false,
    };
    h.session.acquire(constraints.clone()).await?;

    assert_eq!(h.session.state(), CaptureState::Live);
    let requests = h.gateway.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], constraints);
    assert_eq!(requests[1], MediaConstraints::video_only());

    Ok(())
}

#[tokio::test]
async fn test_overconstrained_bare_request_is_not_found() -> Result<()> {
    let h = Harness::new();
    h.gateway.push(Outcome::Fail(DeviceError::Overconstrained(
        "no camera matches".to_string(),
    )));

    let err = h
        .session
        .acquire(MediaConstraints::video_only())
        .await
        .unwrap_err();

    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::DeviceNotFound));
    assert_eq!(h.gateway.request_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_grant_without_video_is_stopped() -> Result<()> {
    let h = Harness::new();
    h.gateway.push(Outcome::GrantWithoutVideo);

    let err = h
        .session
        .acquire(MediaConstraints::video_only())
        .await
        .unwrap_err();

    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::DeviceNotFound));
    assert_eq!(h.session.state(), CaptureState::Failed);
    assert_eq!(h.gateway.issued_count(), 1);
    assert_eq!(h.gateway.live_tracks(), 0);

    Ok(())
}

#[tokio::test]
async fn test_preview_failure_is_a_render_error() -> Result<()> {
    let h = Harness::new();
    h.preview.set_mode(PreviewMode::FailReady);

    let err = h
        .session
        .acquire(MediaConstraints::video_only())
        .await
        .unwrap_err();

    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::RenderError));
    assert_eq!(h.session.state(), CaptureState::Failed);
    assert_eq!(h.gateway.live_tracks(), 0);
    assert!(!h.preview.is_attached());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_preview_that_never_renders_times_out() -> Result<()> {
    let h = Harness::new();
    h.preview.set_mode(PreviewMode::NeverReady);

    let started = tokio::time::Instant::now();
    let err = h
        .session
        .acquire(MediaConstraints::video_only())
        .await
        .unwrap_err();

    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::DeviceTimeout));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(h.session.state(), CaptureState::Failed);
    assert_eq!(h.gateway.live_tracks(), 0);
    assert!(!h.preview.is_attached());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_late_grant_after_timeout_is_reaped() -> Result<()> {
    let config = SessionConfig {
        acquire_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let h = Harness::with_config(config);
    h.gateway
        .push_delayed(Outcome::Grant, Duration::from_secs(5));

    let err = h
        .session
        .acquire(MediaConstraints::audio_video())
        .await
        .unwrap_err();
    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::DeviceTimeout));

    // The grant lands after the session gave up
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.gateway.issued_count(), 2);
    assert_eq!(h.gateway.live_tracks(), 0);
    assert_eq!(h.session.state(), CaptureState::Failed);
    assert!(h.session.stream().is_none());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_during_acquisition_cancels_it() -> Result<()> {
    let h = Harness::new();
    h.gateway
        .push_delayed(Outcome::Grant, Duration::from_secs(3));

    let session = h.session.clone();
    let pending =
        tokio::spawn(async move { session.acquire(MediaConstraints::audio_video()).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.session.state(), CaptureState::Acquiring);

    h.session.release();
    assert_eq!(h.session.state(), CaptureState::Idle);

    let result = pending.await?;
    assert!(matches!(result, Err(SessionError::Cancelled)));

    // Grant arrived after release and was stopped on arrival
    assert_eq!(h.gateway.issued_count(), 2);
    assert_eq!(h.gateway.live_tracks(), 0);
    assert_eq!(h.session.state(), CaptureState::Idle);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_acquire_rejected_while_acquiring_or_recording() -> Result<()> {
    let h = Harness::new();
    h.gateway
        .push_delayed(Outcome::Grant, Duration::from_secs(1));

    let session = h.session.clone();
    let first = tokio::spawn(async move { session.acquire(MediaConstraints::audio_only()).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.session.state(), CaptureState::Acquiring);

    let err = h
        .session
        .acquire(MediaConstraints::audio_only())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));

    first.await??;
    assert_eq!(h.session.state(), CaptureState::Live);

    h.session.start_recording()?;
    let err = h
        .session
        .acquire(MediaConstraints::audio_only())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));
    assert_eq!(h.session.state(), CaptureState::Recording);

    Ok(())
}

#[tokio::test]
async fn test_add_audio_track_merges_into_video_handle() -> Result<()> {
    let h = Harness::new();
    h.session.acquire(MediaConstraints::video_only()).await?;
    let mut events = h.session.subscribe();

    h.session.add_audio_track().await?;

    let stream = h.session.stream().unwrap();
    assert!(stream.has_video());
    assert!(stream.has_audio());
    assert_eq!(h.gateway.live_tracks(), 2);
    assert_eq!(h.gateway.requests()[1], MediaConstraints::audio_only());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::AudioTrackAdded)));

    // Already present: no second request
    h.session.add_audio_track().await?;
    assert_eq!(h.gateway.request_count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_add_audio_failure_keeps_video_handle() -> Result<()> {
    let h = Harness::new();
    h.session.acquire(MediaConstraints::video_only()).await?;
    h.gateway
        .push(Outcome::Fail(DeviceError::NotFound("no mic".to_string())));

    let err = h.session.add_audio_track().await.unwrap_err();

    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::DeviceNotFound));
    assert_eq!(h.session.state(), CaptureState::Live);
    let stream = h.session.stream().unwrap();
    assert!(stream.has_video());
    assert!(stream.is_active());
    assert_eq!(
        h.session.last_error().map(|e| e.kind),
        Some(CaptureErrorKind::DeviceNotFound)
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_add_audio_times_out_like_acquisition() -> Result<()> {
    let h = Harness::new();
    h.session.acquire(MediaConstraints::video_only()).await?;
    h.gateway
        .push_delayed(Outcome::Grant, Duration::from_secs(3600));

    let started = tokio::time::Instant::now();
    let err = h.session.add_audio_track().await.unwrap_err();

    assert_eq!(capture_kind(&err), Some(CaptureErrorKind::DeviceTimeout));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(h.session.state(), CaptureState::Live);
    let stream = h.session.stream().unwrap();
    assert!(stream.has_video());
    assert!(!stream.has_audio());

    // The microphone grant lands much later and is stopped on arrival
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(h.gateway.issued_count(), 2);
    assert_eq!(h.gateway.live_tracks(), 1);
    assert!(!h.session.stream().unwrap().has_audio());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_cancels_pending_add_audio() -> Result<()> {
    let h = Harness::new();
    h.session.acquire(MediaConstraints::video_only()).await?;
    h.gateway
        .push_delayed(Outcome::Grant, Duration::from_secs(3600));

    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.add_audio_track().await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!pending.is_finished());

    h.session.release();

    let result = tokio::time::timeout(Duration::from_secs(1), pending).await??;
    assert!(matches!(result, Err(SessionError::Cancelled)));
    assert_eq!(h.session.state(), CaptureState::Idle);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(h.gateway.issued_count(), 2);
    assert_eq!(h.gateway.live_tracks(), 0);

    Ok(())
}

#[tokio::test]
async fn test_remove_audio_track_stops_microphone() -> Result<()> {
    let h = Harness::new();
    h.session.acquire(MediaConstraints::audio_video()).await?;

    h.session.remove_audio_track()?;

    let stream = h.session.stream().unwrap();
    assert!(!stream.has_audio());
    assert_eq!(h.gateway.live_tracks(), 1);

    // Not allowed without a handle
    h.session.release();
    assert!(h.session.remove_audio_track().is_err());

    Ok(())
}

#[tokio::test]
async fn test_diagnostics_reflect_held_handle() -> Result<()> {
    let h = Harness::new();
    h.session.acquire(MediaConstraints::audio_video()).await?;

    let diag = h.session.diagnostics();
    assert_eq!(diag.state, CaptureState::Live);
    assert_eq!(diag.gateway, "fake");
    assert!(diag.stream_active);
    assert_eq!(diag.video_tracks, 1);
    assert_eq!(diag.audio_tracks, 1);
    assert_eq!(diag.live_tracks, 2);
    assert_eq!(diag.recordings, 0);

    Ok(())
}
