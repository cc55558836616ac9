/// Job lifecycle tests
/// Drive the transcoding service end to end: submit, workers, store, fetch.
mod common;

use bytes::Bytes;
use common::{fixtures, test_config, wait_for_terminal, wav_source};
use resound_audio::{probe, FormatRegistry};
use resound_core::{EncodingOptions, ErrorKind, FormatTag, JobState, ResoundError};
use resound_server::TranscodingService;
use std::io::Cursor;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wav_to_wav_succeeds_with_matching_duration() {
    let service = TranscodingService::new(&test_config(1, 8));
    service.start();

    let source = wav_source(44_100, 1.5, 2);
    let id = service
        .submit(
            source,
            "wav",
            "WAV",
            EncodingOptions::default().with_sample_rate(48_000),
        )
        .await
        .unwrap();

    let job = wait_for_terminal(&service, &id).await;
    assert_eq!(job.state, JobState::Succeeded, "job failed: {:?}", job.error);
    assert_eq!(job.progress, 1.0);
    assert!(job.error.is_none());
    assert_eq!(job.source.unwrap().sample_rate, 44_100);

    let artifact = service.fetch(&id).unwrap();
    assert_eq!(artifact.format, FormatTag::Wav);
    assert_eq!(job.artifact.unwrap().size, artifact.size());

    let reader = hound::WavReader::new(Cursor::new(artifact.bytes.to_vec())).unwrap();
    assert_eq!(reader.spec().sample_rate, 48_000);
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.duration(), 72_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wav_to_flac_artifact_probes_as_flac() {
    let service = TranscodingService::new(&test_config(2, 8));
    service.start();

    let id = service
        .submit(
            wav_source(22_050, 1.0, 1),
            "wav",
            "flac",
            EncodingOptions::default(),
        )
        .await
        .unwrap();

    let job = wait_for_terminal(&service, &id).await;
    assert_eq!(job.state, JobState::Succeeded, "job failed: {:?}", job.error);

    let artifact = service.fetch(&id).unwrap();
    assert!(artifact.bytes.starts_with(b"fLaC"));

    let registry = FormatRegistry::new();
    let descriptor = probe(artifact.bytes, registry.get(FormatTag::Flac)).unwrap();
    assert_eq!(descriptor.sample_rate, 22_050);
    assert_eq!(descriptor.channels, 1);
    assert_eq!(descriptor.duration_ms, Some(1000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_many_jobs_all_complete() {
    let service = TranscodingService::new(&test_config(2, 16));
    service.start();

    let mut ids = Vec::new();
    for i in 0..6u16 {
        let target = if i % 2 == 0 { "wav" } else { "flac" };
        let id = service
            .submit(
                wav_source(16_000, 0.5, 1 + i % 2),
                "wav",
                target,
                EncodingOptions::default(),
            )
            .await
            .unwrap();
        ids.push(id);
    }

    for id in &ids {
        let job = wait_for_terminal(&service, id).await;
        assert_eq!(job.state, JobState::Succeeded);
        assert!(service.fetch(id).is_ok());
    }
    assert_eq!(service.queue_depth(), 0);
}

#[tokio::test]
async fn test_unsupported_formats_are_rejected_at_submit() {
    let service = TranscodingService::new(&test_config(1, 8));
    let source = wav_source(8_000, 0.1, 1);

    for (from, to) in [("wav", "mp3"), ("wav", "opus"), ("wma", "wav"), ("wav", "aac")] {
        let err = service
            .submit(source.clone(), from, to, EncodingOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat, "{} -> {}", from, to);
    }
    assert_eq!(service.job_count(), 0);
}

#[tokio::test]
async fn test_out_of_range_options_are_invalid_input() {
    let service = TranscodingService::new(&test_config(1, 8));
    let source = wav_source(8_000, 0.1, 1);

    let cases = [
        EncodingOptions::default().with_bitrate_kbps(128),
        EncodingOptions::default().with_sample_rate(12_345),
        EncodingOptions::default().with_bit_depth(12),
        EncodingOptions::default().with_channels(0),
    ];
    for options in cases {
        let err = service
            .submit(source.clone(), "wav", "flac", options)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{:?}", options);
    }
}

#[tokio::test]
async fn test_truncated_mp3_is_invalid_input() {
    let service = TranscodingService::new(&test_config(1, 8));
    let err = service
        .submit(
            Bytes::from_static(fixtures::TRUNCATED_MP3),
            "mp3",
            "wav",
            EncodingOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(service.job_count(), 0);
}

#[tokio::test]
async fn test_mislabelled_source_is_invalid_input() {
    let service = TranscodingService::new(&test_config(1, 8));
    let err = service
        .submit(wav_source(8_000, 0.1, 1), "flac", "wav", EncodingOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_backpressure_does_not_disturb_queued_jobs() {
    // No workers started: everything stays queued
    let service = TranscodingService::new(&test_config(1, 2));
    let source = wav_source(8_000, 0.1, 1);

    let first = service
        .submit(source.clone(), "wav", "flac", EncodingOptions::default())
        .await
        .unwrap();
    let second = service
        .submit(source.clone(), "wav", "flac", EncodingOptions::default())
        .await
        .unwrap();

    let err = service
        .submit(source, "wav", "flac", EncodingOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ResoundError::Backpressure { depth: 2 }));
    assert!(err.kind().is_retryable());

    assert_eq!(service.status(&first).unwrap().state, JobState::Queued);
    assert_eq!(service.status(&second).unwrap().state, JobState::Queued);
    assert_eq!(service.queue_depth(), 2);
}

#[tokio::test]
async fn test_fetch_before_completion_is_not_ready() {
    let service = TranscodingService::new(&test_config(1, 8));
    let id = service
        .submit(wav_source(8_000, 0.1, 1), "wav", "wav", EncodingOptions::default())
        .await
        .unwrap();

    let err = service.fetch(&id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
}

#[tokio::test]
async fn test_cancel_queued_job() {
    let service = TranscodingService::new(&test_config(1, 8));
    let id = service
        .submit(wav_source(8_000, 0.1, 1), "wav", "wav", EncodingOptions::default())
        .await
        .unwrap();

    assert_eq!(service.cancel(&id).unwrap(), JobState::Cancelled);
    assert_eq!(service.status(&id).unwrap().state, JobState::Cancelled);
    assert_eq!(service.queue_depth(), 0);
    assert_eq!(service.fetch(&id).unwrap_err().kind(), ErrorKind::NotFound);

    // Starting workers afterwards must not resurrect it
    service.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(service.status(&id).unwrap().state, JobState::Cancelled);
    assert_eq!(service.fetch(&id).unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_running_job_stops_at_chunk_boundary() {
    let mut config = test_config(1, 8);
    config.transcoding.chunk_frames = 256;
    config.transcoding.resampling_quality = resound_audio::ResamplingQuality::Maximum;
    let service = TranscodingService::new(&config);
    service.start();

    let id = service
        .submit(
            wav_source(48_000, 30.0, 2),
            "wav",
            "flac",
            EncodingOptions::default().with_sample_rate(44_100),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(30), async {
        while service.status(&id).unwrap().state != JobState::Running {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("job never started");

    assert_eq!(service.cancel(&id).unwrap(), JobState::Running);

    let job = wait_for_terminal(&service, &id).await;
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.error.is_none());
    assert_eq!(service.fetch(&id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(service.artifact_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ttl_eviction_keeps_job_succeeded() {
    let service = TranscodingService::new(&test_config(1, 8));
    service.start();

    let id = service
        .submit(wav_source(8_000, 0.2, 1), "wav", "wav", EncodingOptions::default())
        .await
        .unwrap();
    wait_for_terminal(&service, &id).await;
    assert!(service.fetch(&id).is_ok());

    let (artifacts, jobs) = service.sweep(Instant::now() + Duration::from_secs(61));
    assert_eq!((artifacts, jobs), (1, 0));

    assert_eq!(service.status(&id).unwrap().state, JobState::Succeeded);
    assert_eq!(service.fetch(&id).unwrap_err().kind(), ErrorKind::NotFound);

    // Past job retention the record goes too
    service.sweep(Instant::now() + Duration::from_secs(601));
    assert_eq!(service.status(&id).unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_evict_on_fetch() {
    let mut config = test_config(1, 8);
    config.retention.evict_on_fetch = true;
    let service = TranscodingService::new(&config);
    service.start();

    let id = service
        .submit(wav_source(8_000, 0.2, 1), "wav", "flac", EncodingOptions::default())
        .await
        .unwrap();
    wait_for_terminal(&service, &id).await;

    assert!(service.fetch(&id).is_ok());
    assert_eq!(service.fetch(&id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(service.status(&id).unwrap().state, JobState::Succeeded);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let service = TranscodingService::new(&test_config(1, 8));
    let id = resound_core::JobId::new("does-not-exist");
    assert_eq!(service.status(&id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(service.cancel(&id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(service.fetch(&id).unwrap_err().kind(), ErrorKind::NotFound);
}

/// Assert a job failed with `kind`, carries a message and left nothing behind
fn assert_failed_cleanly(
    service: &TranscodingService,
    job: &resound_core::ConversionJob,
    kind: ErrorKind,
) {
    assert_eq!(job.state, JobState::Failed);
    let error = job.error.as_ref().expect("failed job must carry an error");
    assert_eq!(error.kind, kind, "{}", error.message);
    assert!(!error.message.is_empty());
    assert!(job.artifact.is_none());
    assert_eq!(service.fetch(&job.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(service.artifact_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_step_timeout_fails_job() {
    let mut config = test_config(1, 8);
    config.transcoding.chunk_timeout_ms = 1;
    let service = TranscodingService::new(&config);
    service.start();

    let id = service
        .submit(
            wav_source(48_000, 5.0, 2),
            "wav",
            "flac",
            EncodingOptions::default().with_sample_rate(44_100),
        )
        .await
        .unwrap();

    let job = wait_for_terminal(&service, &id).await;
    assert_failed_cleanly(&service, &job, ErrorKind::Timeout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_truncated_wav_body_fails_with_decode_error() {
    let service = TranscodingService::new(&test_config(1, 8));
    service.start();

    let source = wav_source(44_100, 1.0, 1);
    let truncated = source.slice(..source.len() / 2);

    let id = service
        .submit(truncated, "wav", "flac", EncodingOptions::default())
        .await
        .unwrap();

    let job = wait_for_terminal(&service, &id).await;
    assert_failed_cleanly(&service, &job, ErrorKind::DecodeError);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_corrupt_flac_fails_with_decode_error() {
    let service = TranscodingService::new(&test_config(1, 8));
    service.start();

    let encode = service
        .submit(wav_source(44_100, 1.0, 1), "wav", "flac", EncodingOptions::default())
        .await
        .unwrap();
    assert_eq!(wait_for_terminal(&service, &encode).await.state, JobState::Succeeded);

    let mut flac = service.fetch(&encode).unwrap().bytes.to_vec();
    service.sweep(Instant::now() + Duration::from_secs(61));
    assert_eq!(service.artifact_count(), 0);

    let middle = flac.len() / 2;
    for byte in &mut flac[middle..middle + 64] {
        *byte ^= 0xFF;
    }

    let id = service
        .submit(Bytes::from(flac), "flac", "wav", EncodingOptions::default())
        .await
        .unwrap();

    let job = wait_for_terminal(&service, &id).await;
    assert_failed_cleanly(&service, &job, ErrorKind::DecodeError);
}
