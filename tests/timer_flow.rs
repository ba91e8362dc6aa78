use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use pretty_assertions::assert_eq;
use serde_json::json;
use smartsynch_lib::{
    bridge::LocalWindowHost,
    db::Database,
    models::{Category, Task, TaskDraft, TaskEdit},
    predictor::{
        feedback::{CategoryFeedback, FeedbackService},
        BoxFuture, PredictionRequest, PredictionResponse, PredictionService,
    },
    settings::{AppSettings, SettingsOverrides},
    tasks::{commands as task_commands, TaskReconciler},
    timer::{commands as timer_commands, TimerStatus},
    AppState,
};
use tokio::time;

struct FixedPredictor {
    category: &'static str,
    confidence: f64,
}

impl PredictionService for FixedPredictor {
    fn predict<'a>(&'a self, _request: &'a PredictionRequest) -> BoxFuture<'a, Result<PredictionResponse>> {
        let response = PredictionResponse {
            category: json!(self.category),
            category_id: None,
            confidence: self.confidence,
            probabilities: None,
        };
        Box::pin(async move { Ok(response) })
    }
}

struct UnreachablePredictor;

impl PredictionService for UnreachablePredictor {
    fn predict<'a>(&'a self, _request: &'a PredictionRequest) -> BoxFuture<'a, Result<PredictionResponse>> {
        Box::pin(async { Err(anyhow!("connection refused")) })
    }
}

#[derive(Default)]
struct RecordingFeedback {
    received: Mutex<Vec<CategoryFeedback>>,
}

impl FeedbackService for RecordingFeedback {
    fn submit<'a>(&'a self, feedback: &'a CategoryFeedback) -> BoxFuture<'a, Result<()>> {
        self.received.lock().unwrap().push(feedback.clone());
        Box::pin(async { Ok(()) })
    }
}

struct Harness {
    state: AppState,
    overlay: LocalWindowHost,
    feedback: Arc<RecordingFeedback>,
}

async fn harness_with(overlay: bool, predictor: Arc<dyn PredictionService>) -> Harness {
    let mut settings = AppSettings::default();
    settings.apply(&SettingsOverrides {
        no_overlay: !overlay,
        ..Default::default()
    });

    let tasks = TaskReconciler::load(Database::open_in_memory().unwrap())
        .await
        .unwrap();
    let host = LocalWindowHost::new(overlay);
    let feedback = Arc::new(RecordingFeedback::default());
    let state = AppState::new(
        tasks,
        Arc::new(host.clone()),
        predictor,
        feedback.clone(),
        &settings,
    );

    Harness {
        state,
        overlay: host,
        feedback,
    }
}

async fn harness(overlay: bool) -> Harness {
    harness_with(overlay, Arc::new(UnreachablePredictor)).await
}

async fn create(state: &AppState, title: &str) -> Task {
    task_commands::create_task(
        state,
        TaskDraft {
            title: title.into(),
            description: "integration scenario".into(),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn sixty_five_seconds_produce_one_record() {
    let Harness { state, .. } = harness(false).await;
    let task = create(&state, "Write report").await;
    assert_eq!(task.elapsed_seconds(), 0);

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    time::sleep(Duration::from_millis(65_500)).await;
    let stopped = timer_commands::stop_timer(&state).await.unwrap().unwrap();

    assert_eq!(stopped.time_records.len(), 1);
    assert_eq!(stopped.time_records[0].seconds, 65);
    assert_eq!(stopped.time_spent, Some(65));
    assert_eq!(state.tasks.get(&task.id).await.unwrap(), stopped);
}

#[tokio::test(start_paused = true)]
async fn second_session_resumes_from_recorded_time() {
    let Harness { state, .. } = harness(false).await;
    let task = create(&state, "Write report").await;

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    time::sleep(Duration::from_millis(10_500)).await;
    timer_commands::stop_timer(&state).await.unwrap();

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    time::sleep(Duration::from_millis(5_200)).await;
    let stopped = timer_commands::stop_timer(&state).await.unwrap().unwrap();

    let seconds: Vec<u64> = stopped.time_records.iter().map(|r| r.seconds).collect();
    assert_eq!(seconds, vec![10, 15]);
    assert_eq!(stopped.time_spent, Some(15));
}

#[tokio::test(start_paused = true)]
async fn starting_another_task_while_running_is_rejected() {
    let Harness { state, .. } = harness(false).await;
    let first = create(&state, "First").await;
    let second = create(&state, "Second").await;

    timer_commands::start_timer(&state, &first.id).await.unwrap();
    let err = timer_commands::start_timer(&state, &second.id)
        .await
        .unwrap_err();
    assert!(err.contains(&first.id), "unexpected error: {err}");

    let snapshot = timer_commands::get_timer_state(&state).await.unwrap();
    assert_eq!(snapshot.state.status, TimerStatus::Running);
    assert_eq!(snapshot.state.task_id.as_deref(), Some(first.id.as_str()));
}

#[tokio::test(start_paused = true)]
async fn stopping_twice_records_once() {
    let Harness { state, .. } = harness(false).await;
    let task = create(&state, "Idempotent").await;

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    time::sleep(Duration::from_millis(3_500)).await;
    assert!(timer_commands::stop_timer(&state).await.unwrap().is_some());
    assert!(timer_commands::stop_timer(&state).await.unwrap().is_none());
    assert!(timer_commands::stop_timer(&state).await.unwrap().is_none());

    let stored = state.tasks.get(&task.id).await.unwrap();
    assert_eq!(stored.time_records.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_after_task_removed_is_not_found_and_discarded() {
    let Harness { state, .. } = harness(false).await;
    let task = create(&state, "Doomed").await;

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    time::sleep(Duration::from_millis(2_500)).await;
    // Bypass the command layer so the session is still bound.
    state.tasks.delete(&task.id).await.unwrap();

    let err = timer_commands::stop_timer(&state).await.unwrap_err();
    assert!(err.contains("not found"), "unexpected error: {err}");
    let snapshot = timer_commands::get_timer_state(&state).await.unwrap();
    assert_eq!(snapshot.state.status, TimerStatus::Idle);
    assert!(state.tasks.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_command_stops_the_bound_timer_first() {
    let Harness { state, .. } = harness(false).await;
    let task = create(&state, "Delete me").await;

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    time::sleep(Duration::from_millis(1_500)).await;
    task_commands::delete_task(&state, &task.id).await.unwrap();

    assert!(!state.timer.is_running_for(&task.id));
    assert!(task_commands::get_task(&state, &task.id).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn closing_the_overlay_stops_exactly_once() {
    let Harness { state, overlay, .. } = harness(true).await;
    let task = create(&state, "Overlay").await;
    let mut events = state.timer.subscribe();

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    assert!(overlay.is_open());
    time::sleep(Duration::from_millis(4_500)).await;

    assert!(overlay.close_window());
    time::sleep(Duration::from_secs(3)).await;

    let stored = state.tasks.get(&task.id).await.unwrap();
    assert_eq!(stored.time_records.len(), 1);
    assert_eq!(stored.time_spent, Some(4));
    assert!(timer_commands::stop_timer(&state).await.unwrap().is_none());

    let mut stops = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, smartsynch_lib::timer::TimerEvent::Stopped { .. }) {
            stops += 1;
        }
    }
    assert_eq!(stops, 1);
}

#[tokio::test(start_paused = true)]
async fn overlay_stop_followed_by_manual_stop_records_once() {
    let Harness { state, overlay, .. } = harness(true).await;
    let task = create(&state, "Overlay").await;

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    time::sleep(Duration::from_millis(2_500)).await;
    overlay.press_stop();
    timer_commands::stop_timer(&state).await.unwrap();
    time::sleep(Duration::from_secs(3)).await;

    let stored = state.tasks.get(&task.id).await.unwrap();
    assert_eq!(stored.time_records.len(), 1);
    assert_eq!(stored.time_spent, Some(2));
}

#[tokio::test(start_paused = true)]
async fn editing_time_while_running_resyncs_the_session() {
    let Harness { state, .. } = harness(false).await;
    let task = create(&state, "Resync").await;

    timer_commands::start_timer(&state, &task.id).await.unwrap();
    time::sleep(Duration::from_millis(2_500)).await;

    let mut edit = TaskEdit::from(&task);
    edit.time_spent = Some(120);
    task_commands::update_task(&state, edit, None).await.unwrap();
    assert_eq!(
        timer_commands::get_timer_state(&state).await.unwrap().display,
        "00:02:00"
    );

    // Paused time may advance while the store is written, so compare with
    // the live count rather than a fixed total.
    time::sleep(Duration::from_secs(1)).await;
    let live = timer_commands::get_timer_state(&state)
        .await
        .unwrap()
        .state
        .elapsed_seconds;
    assert!((120..=122).contains(&live), "unexpected live count {live}");

    let stopped = timer_commands::stop_timer(&state).await.unwrap().unwrap();
    assert_eq!(stopped.time_spent, Some(live));
}

#[tokio::test(start_paused = true)]
async fn low_confidence_prediction_is_not_applied() {
    let predictor = Arc::new(FixedPredictor {
        category: "meeting",
        confidence: 0.5,
    });
    let Harness { state, .. } = harness_with(false, predictor).await;

    let suggestion =
        task_commands::suggest_category(&state, "Sprint sync", "Weekly planning with the team").await;
    assert_eq!(suggestion, None);
}

#[tokio::test(start_paused = true)]
async fn submitting_a_suggested_draft_reports_feedback() {
    let predictor = Arc::new(FixedPredictor {
        category: "meeting",
        confidence: 0.9,
    });
    let Harness {
        state, feedback, ..
    } = harness_with(false, predictor).await;

    let suggestion =
        task_commands::suggest_category(&state, "Sprint sync", "Weekly planning with the team")
            .await
            .unwrap();
    assert_eq!(suggestion.category, Category::Meeting);

    let draft = TaskDraft {
        title: "Sprint sync".into(),
        description: "Weekly planning with the team".into(),
        category: Category::Planning,
        ..Default::default()
    };
    task_commands::create_task(&state, draft, Some(suggestion))
        .await
        .unwrap();
    time::sleep(Duration::from_millis(10)).await;

    let received = feedback.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].predicted_category, "meeting");
    assert_eq!(received[0].actual_category, "planning");
    assert!(!received[0].accepted);
}

#[tokio::test(start_paused = true)]
async fn editing_with_a_suggestion_reports_feedback() {
    let predictor = Arc::new(FixedPredictor {
        category: "meeting",
        confidence: 0.9,
    });
    let Harness {
        state, feedback, ..
    } = harness_with(false, predictor).await;
    let task = create(&state, "Sprint sync").await;

    let mut edit = TaskEdit::from(&task);
    edit.description = "Weekly planning with the team".into();
    let suggestion = task_commands::suggest_category(&state, &edit.title, &edit.description).await;
    assert!(suggestion.is_some());

    let updated = task_commands::update_task(&state, edit, suggestion)
        .await
        .unwrap();
    time::sleep(Duration::from_millis(10)).await;

    let received = feedback.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].description, "Weekly planning with the team");
    assert_eq!(received[0].predicted_category, "meeting");
    assert_eq!(received[0].actual_category, updated.category.as_str());
    assert!(!received[0].accepted);
}
