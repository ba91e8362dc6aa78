use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex as AsyncMutex},
    time::Duration,
};

use crate::{
    bridge::{CrossWindowBridge, OverlayGeometry, WindowHost},
    error::{TaskError, TaskResult},
    models::{Task, TimeRecord},
    tasks::TaskReconciler,
    utils::format::format_clock,
};

use super::{clock::Clock, state::Completed, TimerState};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct TimerConfig {
    pub tick_interval: Duration,
    pub closure_poll_interval: Duration,
    /// `None` runs without a secondary window.
    pub overlay: Option<OverlayGeometry>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            closure_poll_interval: Duration::from_secs(1),
            overlay: Some(OverlayGeometry::default()),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub display: String,
}

impl TimerSnapshot {
    fn of(state: &TimerState) -> Self {
        Self {
            display: format_clock(state.elapsed_seconds),
            state: state.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TimerEvent {
    Started {
        task_id: String,
        task_name: String,
        seconds: u64,
    },
    Tick {
        task_id: String,
        seconds: u64,
    },
    Stopped {
        task_id: String,
        record: TimeRecord,
    },
    Resynced {
        task_id: String,
        seconds: u64,
    },
}

struct SessionInner {
    state: TimerState,
    clock: Option<Clock>,
    bridge: Option<CrossWindowBridge>,
}

/// The single owner of the running timer.
///
/// At most one task is tracked at a time. Ticks only update the live state
/// and the overlay; the stop record reaches the reconciler on `stop()`.
#[derive(Clone)]
pub struct TimerController {
    inner: Arc<Mutex<SessionInner>>,
    /// Held from the moment a stop takes the clock until its record is
    /// committed, so `start_task` never reads a stale `timeSpent`.
    flushing: Arc<AsyncMutex<()>>,
    reconciler: TaskReconciler,
    host: Arc<dyn WindowHost>,
    events: broadcast::Sender<TimerEvent>,
    config: TimerConfig,
}

/// Held by the overlay's stop callback so the bridge, which lives inside
/// the session, doesn't keep the session alive.
struct WeakController {
    inner: Weak<Mutex<SessionInner>>,
    flushing: Arc<AsyncMutex<()>>,
    reconciler: TaskReconciler,
    host: Arc<dyn WindowHost>,
    events: broadcast::Sender<TimerEvent>,
    config: TimerConfig,
}

impl WeakController {
    fn upgrade(&self) -> Option<TimerController> {
        Some(TimerController {
            inner: self.inner.upgrade()?,
            flushing: self.flushing.clone(),
            reconciler: self.reconciler.clone(),
            host: self.host.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        })
    }
}

impl TimerController {
    pub fn new(reconciler: TaskReconciler, host: Arc<dyn WindowHost>, config: TimerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                state: TimerState::new(),
                clock: None,
                bridge: None,
            })),
            flushing: Arc::new(AsyncMutex::new(())),
            reconciler,
            host,
            events,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub fn get_snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::of(&self.lock().state)
    }

    pub fn is_running_for(&self, task_id: &str) -> bool {
        self.lock().state.is_running_for(task_id)
    }

    /// Starts the timer for a stored task from its recorded time. Waits for
    /// a stop still committing its record before reading that time.
    pub async fn start_task(&self, task_id: &str) -> TaskResult<TimerSnapshot> {
        let _flushed = self.flushing.lock().await;
        let task = self
            .reconciler
            .get(task_id)
            .await
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        self.start(&task.id, &task.title, task.elapsed_seconds()).await
    }

    /// Binds the clock to `task_id`, counting on from `initial_seconds`.
    ///
    /// Fails with `Conflict` while another task is running. Starting the
    /// task that is already running changes nothing.
    pub async fn start(
        &self,
        task_id: &str,
        task_name: &str,
        initial_seconds: u64,
    ) -> TaskResult<TimerSnapshot> {
        let snapshot = {
            let mut guard = self.lock();
            if guard.state.is_running_for(task_id) {
                return Ok(TimerSnapshot::of(&guard.state));
            }
            if guard.state.is_running() {
                return Err(TaskError::Conflict {
                    active_task_id: guard.state.task_id.clone().unwrap_or_default(),
                });
            }

            let generation = guard.state.begin(
                task_id.to_string(),
                task_name.to_string(),
                initial_seconds,
                Utc::now(),
            );

            let mut clock = Clock::with_initial(self.config.tick_interval, initial_seconds);
            let inner = Arc::downgrade(&self.inner);
            let events = self.events.clone();
            clock.start(move |seconds| on_tick(&inner, &events, generation, seconds));
            guard.clock = Some(clock);

            if let Some(geometry) = &self.config.overlay {
                guard.bridge = self.open_bridge(generation, task_name, initial_seconds, geometry);
            }

            TimerSnapshot::of(&guard.state)
        };

        info!("Timer started for task {task_id} at {initial_seconds}s");
        let _ = self.events.send(TimerEvent::Started {
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            seconds: initial_seconds,
        });
        Ok(snapshot)
    }

    /// Ends the running session and hands its record to the reconciler.
    ///
    /// Returns `Ok(None)` when already idle. When the task was deleted in
    /// the meantime the record is dropped and `NotFound` comes back; the
    /// session is idle either way.
    pub async fn stop(&self) -> TaskResult<Option<Task>> {
        self.stop_matching(None).await
    }

    /// Stop issued on behalf of a specific run; ignored once that run ended.
    pub async fn stop_generation(&self, generation: u64) -> TaskResult<Option<Task>> {
        self.stop_matching(Some(generation)).await
    }

    /// Adopts the stored time of the running task when it drifted from the
    /// live count by more than a second. Returns whether it did.
    pub fn reconcile_with(&self, task: &Task) -> bool {
        let seconds = task.elapsed_seconds();
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if !inner.state.is_running_for(&task.id)
                || seconds.abs_diff(inner.state.elapsed_seconds) <= 1
            {
                return false;
            }

            inner.state.elapsed_seconds = seconds;
            if let Some(clock) = &inner.clock {
                clock.set(seconds);
            }
            if let (Some(bridge), Some(name)) = (&inner.bridge, inner.state.task_name.as_deref()) {
                bridge.push_update(seconds, name);
            }
        }

        info!("Timer for task {} resynced to {seconds}s", task.id);
        let _ = self.events.send(TimerEvent::Resynced {
            task_id: task.id.clone(),
            seconds,
        });
        true
    }

    async fn stop_matching(&self, generation: Option<u64>) -> TaskResult<Option<Task>> {
        let _flushing = self.flushing.lock().await;
        let (completed, bridge) = {
            let mut guard = self.lock();
            if generation.is_some_and(|generation| generation != guard.state.generation) {
                return Ok(None);
            }

            let clock_seconds = guard.clock.take().map(|mut clock| clock.stop());
            let final_seconds = clock_seconds.unwrap_or(guard.state.elapsed_seconds);
            let bridge = guard.bridge.take();
            (guard.state.finish(final_seconds, Utc::now()), bridge)
        };

        if let Some(mut bridge) = bridge {
            bridge.close();
        }

        let Some(Completed { task_id, record }) = completed else {
            return Ok(None);
        };

        let _ = self.events.send(TimerEvent::Stopped {
            task_id: task_id.clone(),
            record,
        });

        match self.reconciler.apply_stop(&task_id, record).await {
            Ok(task) => {
                info!("Timer stopped for task {task_id} at {}s", record.seconds);
                Ok(Some(task))
            }
            Err(err) if err.is_not_found() => {
                warn!("Discarding stop record for deleted task {task_id}");
                Err(err)
            }
            Err(err) => {
                error!("Failed to record stop for task {task_id}: {err}");
                Err(err)
            }
        }
    }

    fn open_bridge(
        &self,
        generation: u64,
        task_name: &str,
        initial_seconds: u64,
        geometry: &OverlayGeometry,
    ) -> Option<CrossWindowBridge> {
        let weak = self.downgrade();
        let mut bridge = CrossWindowBridge::new(move || {
            let Some(controller) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                if let Err(err) = controller.stop_generation(generation).await {
                    warn!("Overlay stop failed: {err}");
                }
            });
        });

        if !bridge.open(
            self.host.as_ref(),
            task_name,
            geometry,
            self.config.closure_poll_interval,
        ) {
            return None;
        }
        bridge.push_update(initial_seconds, task_name);
        Some(bridge)
    }

    fn downgrade(&self) -> WeakController {
        WeakController {
            inner: Arc::downgrade(&self.inner),
            flushing: self.flushing.clone(),
            reconciler: self.reconciler.clone(),
            host: self.host.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn on_tick(
    inner: &Weak<Mutex<SessionInner>>,
    events: &broadcast::Sender<TimerEvent>,
    generation: u64,
    seconds: u64,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let (task_id, seconds) = {
        let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
        let session = &mut *guard;
        // A resync may have moved the count since this tick was produced.
        let seconds = session.clock.as_ref().map_or(seconds, Clock::count);
        if !session.state.apply_tick(generation, seconds) {
            return;
        }
        if let (Some(bridge), Some(name)) = (&session.bridge, session.state.task_name.as_deref()) {
            bridge.push_update(seconds, name);
        }
        (session.state.task_id.clone().unwrap_or_default(), seconds)
    };

    let _ = events.send(TimerEvent::Tick { task_id, seconds });
}
