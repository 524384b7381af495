//! GstdClient against a mock daemon over real TCP

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use fixtures::mock_daemon::MockDaemon;
use pipefleet_core::{
    ControlError, ControlPlane, EngineState, ErrorKind, EventKind, GroupRole, HandleOptions, PhaseDelays,
    PipelineHandle, PipelineSpec, ReadinessOptions, RewireSpec, Sequencer, SequencerOptions,
    SnapshotSpec, TargetState, Topology,
};
use pipefleet_gstd::{GstdClient, RetryConfig};
use tokio_test::{assert_err, assert_ok};

fn client(daemon: &MockDaemon) -> GstdClient {
    GstdClient::new(daemon.address())
        .with_timeout(Duration::from_secs(2))
        .with_retry(RetryConfig::none())
}

#[tokio::test]
async fn test_primitives_send_daemon_commands() {
    let daemon = MockDaemon::start().await.unwrap();
    let client = client(&daemon);

    client
        .create_resource("rec", "interpipesrc listen-to=cam ! fakesink")
        .await
        .unwrap();
    client
        .set_parameter("rec", "filesink_rec", "location", "test_rec_0.mkv")
        .await
        .unwrap();
    client.set_state("rec", TargetState::Playing).await.unwrap();
    client.send_event("rec", EventKind::EndOfStream).await.unwrap();
    client.set_state("rec", TargetState::Stopped).await.unwrap();
    client.delete_resource("rec").await.unwrap();

    assert_eq!(
        daemon.received(),
        vec![
            "pipeline_create rec interpipesrc listen-to=cam ! fakesink",
            "element_set rec filesink_rec location test_rec_0.mkv",
            "pipeline_play rec",
            "event_eos rec",
            "pipeline_stop rec",
            "pipeline_delete rec",
        ]
    );
    assert_eq!(
        daemon.property("rec", "filesink_rec", "location").as_deref(),
        Some("test_rec_0.mkv")
    );
    assert_eq!(daemon.state_of("rec"), None);
}

#[tokio::test]
async fn test_daemon_codes_are_classified() {
    let daemon = MockDaemon::start().await.unwrap();
    let client = client(&daemon);

    client.create_resource("cam", "videotestsrc ! fakesink").await.unwrap();

    let duplicate = client.create_resource("cam", "videotestsrc ! fakesink").await;
    assert!(matches!(duplicate, Err(ControlError::DuplicateName(_))));

    let missing = client.set_state("ghost", TargetState::Playing).await;
    assert!(matches!(missing, Err(ControlError::NotFound(_))));

    let not_playing = client.send_event("cam", EventKind::EndOfStream).await;
    assert!(matches!(not_playing, Err(ControlError::InvalidState(_))));
}

#[tokio::test]
async fn test_query_state_and_ping() {
    let daemon = MockDaemon::start().await.unwrap();
    let client = client(&daemon);

    assert_ok!(client.ping().await);
    assert_ok!(client.create_resource("cam", "videotestsrc ! fakesink").await);
    assert_eq!(client.query_state("cam").await.unwrap(), EngineState::Null);

    client.set_state("cam", TargetState::Playing).await.unwrap();
    assert_eq!(client.query_state("cam").await.unwrap(), EngineState::Playing);
    assert_eq!(daemon.received()[0], "read /");
}

#[tokio::test]
async fn test_silent_daemon_times_out() {
    let daemon = MockDaemon::start_silent().await.unwrap();
    let client = client(&daemon).with_timeout(Duration::from_millis(200));

    let err = client.set_state("cam", TargetState::Playing).await.unwrap_err();

    match err {
        ControlError::Timeout { detail, timeout_ms } => {
            assert!(detail.contains("did not answer"));
            assert_eq!(timeout_ms, 200);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(daemon.received(), vec!["pipeline_play cam"]);
}

#[tokio::test]
async fn test_unanswered_create_is_reported_as_timeout() {
    let daemon = MockDaemon::start_silent().await.unwrap();
    let client: Arc<dyn ControlPlane> =
        Arc::new(client(&daemon).with_timeout(Duration::from_millis(200)));

    let err = PipelineHandle::create(client, "cam", "videotestsrc ! fakesink", HandleOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.resource(), Some("cam"));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_unreachable_daemon_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = GstdClient::new(address).with_retry(RetryConfig {
        max_retries: 2,
        backoff_ms: 5,
    });

    let err = assert_err!(client.ping().await);
    assert!(matches!(err, ControlError::Transport(_)));
}

#[tokio::test]
async fn test_handle_over_tcp() {
    let daemon = MockDaemon::start().await.unwrap();
    let client: Arc<dyn ControlPlane> = Arc::new(client(&daemon));

    let mut cam = PipelineHandle::create(
        client.clone(),
        "cam",
        "videotestsrc ! interpipesink name=cam",
        HandleOptions::default(),
    )
    .await
    .unwrap();
    let mut rec = PipelineHandle::create(
        client,
        "rec",
        "interpipesrc name=rec_src listen-to=cam ! fakesink",
        HandleOptions::default(),
    )
    .await
    .unwrap();

    cam.play().await.unwrap();
    rec.rebind_source("cam").await.unwrap();
    rec.play().await.unwrap();
    assert_eq!(rec.query_state().await.unwrap(), EngineState::Playing);

    rec.send_end_of_stream().await.unwrap();
    rec.stop().await.unwrap();
    cam.stop().await.unwrap();
    rec.delete().await.unwrap();
    cam.delete().await.unwrap();

    assert_eq!(
        daemon.property("rec", "rec_src", "listen-to").as_deref(),
        Some("cam")
    );
    assert_eq!(daemon.state_of("cam"), None);
    assert_eq!(daemon.state_of("rec"), None);
}

#[tokio::test]
async fn test_sequencer_run_over_tcp() {
    let daemon = MockDaemon::start().await.unwrap();
    let client: Arc<dyn ControlPlane> = Arc::new(client(&daemon));

    let spec = |name: &str, group| PipelineSpec {
        name: name.to_string(),
        group,
        description: format!("videotestsrc ! interpipesink name={}", name),
    };
    let topology = Topology {
        pipelines: vec![
            spec("cam0", GroupRole::Base),
            spec("cam1", GroupRole::Base),
            spec("enc", GroupRole::Encoding),
            spec("jpeg", GroupRole::Snapshot),
            spec("rec", GroupRole::Recording),
            spec("snap", GroupRole::Snapshot),
        ],
        snapshot: SnapshotSpec {
            writer: "snap".into(),
            encoder: "jpeg".into(),
            alternate_source: "cam1".into(),
        },
        rewire: RewireSpec {
            alternate_source: "cam1".into(),
        },
    };
    let options = SequencerOptions {
        readiness: Some(ReadinessOptions {
            timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }),
        delays: PhaseDelays::none(),
        ..SequencerOptions::default()
    };

    let mut sequencer = Sequencer::new(client, topology, options).unwrap();
    let report = sequencer.run().await.unwrap();

    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(
        daemon.property("enc", "enc_src", "listen-to").as_deref(),
        Some("cam1")
    );
    assert_eq!(
        daemon.property("rec", "filesink_rec", "location").as_deref(),
        Some("test_rec_1.mkv")
    );
    for name in ["cam0", "cam1", "enc", "jpeg", "rec", "snap"] {
        assert_eq!(daemon.state_of(name), None, "{} left behind", name);
    }
}
