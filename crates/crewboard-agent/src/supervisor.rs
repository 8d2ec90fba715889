//! Reconciliation between task state and window liveness. A task marked
//! active must have a live window; when the window dies the supervisor waits
//! out a grace period, re-reads the task, and classifies the exit: the agent
//! finished the stage (it moved the task before exiting), crashed (it did
//! not), or asked for a reset.
//!
//! The grace period exists because agents commonly update the task column
//! and then exit. Classifying on the first dead-window observation would
//! race the agent's final write and call a success a crash.

use crate::runner::get_runner;
use crate::spawn::{
    deactivate_loop_state, enrichment_window_name, spawn, spawn_enrichment, window_name,
};
use crewboard_core::{AgentStatus, EnrichmentStatus, Task, TaskPatch, TaskStatus};
use crewboard_mux::WindowManager;
use crewboard_store::BoardService;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How often the reconciliation tick runs.
    pub poll_interval: Duration,
    /// Delay between observing a dead window and classifying the outcome.
    pub grace_period: Duration,
    /// Runner used for enrichment passes.
    pub enrichment_runner: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2500),
            grace_period: Duration::from_secs(5),
            enrichment_runner: "claude".to_string(),
        }
    }
}

/// Notifications for whoever is watching the board (the TUI surfaces these
/// in its notification area).
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    AgentCompleted { task_id: String, title: String },
    AgentCrashed { task_id: String, title: String },
    AgentReset { task_id: String, title: String },
    AgentRespawned { task_id: String, title: String, column: TaskStatus },
    EnrichmentStarted { task_id: String },
    EnrichmentFailed { task_id: String },
    EnrichmentSkipped { task_id: String },
}

/// A task whose window died, waiting out the grace period.
#[derive(Debug, Clone, Copy)]
struct PendingRecon {
    detected_at: Instant,
    column_at_detection: TaskStatus,
}

pub struct Supervisor {
    service: BoardService,
    mux: WindowManager,
    config: SupervisorConfig,
    /// Keyed by task id; touched only by the supervisor task, no lock.
    pending: HashMap<String, PendingRecon>,
    /// Same discipline for enrichment windows.
    enrich_pending: HashMap<String, Instant>,
    events: mpsc::Sender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        service: BoardService,
        mux: WindowManager,
        config: SupervisorConfig,
    ) -> (Self, mpsc::Receiver<SupervisorEvent>) {
        let (events, rx) = mpsc::channel(64);
        (
            Self {
                service,
                mux,
                config,
                pending: HashMap::new(),
                enrich_pending: HashMap::new(),
                events,
            },
            rx,
        )
    }

    /// Tick until shutdown. Errors are logged and the loop continues; a
    /// broken tick must not take the process down.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => self.tick(),
            }
        }
    }

    /// One reconciliation pass: a single window listing, a single task
    /// listing, then the state machine per active task. The first tick after
    /// startup doubles as stale-state recovery: every active task without a
    /// window enters the grace period immediately, covering crashes that
    /// happened while no supervisor was running.
    pub fn tick(&mut self) {
        let windows = self.mux.list_windows();
        let tasks = match self.service.list_tasks() {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(event = "supervisor_list_failed", error = %err);
                return;
            }
        };
        self.tick_with_windows(&windows, &tasks, Instant::now());
    }

    /// The state machine proper, driven by an externally observed window
    /// set. Split out so tests can feed synthetic liveness and time.
    pub fn tick_with_windows(&mut self, windows: &HashSet<String>, tasks: &[Task], now: Instant) {
        for task in tasks {
            if task.agent_status == AgentStatus::Active {
                self.reconcile_agent(windows, task, now);
            }
            match task.enrichment_status {
                EnrichmentStatus::Pending => self.start_enrichment(task),
                EnrichmentStatus::Enriching => self.reconcile_enrichment(windows, task, now),
                _ => {}
            }
        }

        // Drop pending entries whose tasks vanished (deleted mid-grace).
        let alive: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        self.pending.retain(|id, _| alive.contains(id.as_str()));
        self.enrich_pending.retain(|id, _| alive.contains(id.as_str()));
    }

    fn reconcile_agent(&mut self, windows: &HashSet<String>, task: &Task, now: Instant) {
        let name = window_name(task);

        if windows.contains(&name) {
            self.pending.remove(&task.id);
            // A live agent under a column it was not spawned into means a
            // peer moved the task; the stage prompt is stale, respawn.
            if !task.agent_spawned_status.is_empty()
                && task.agent_spawned_status != task.status.as_str()
            {
                self.respawn(task);
            }
            return;
        }

        let pending = match self.pending.get(&task.id) {
            None => {
                self.pending.insert(
                    task.id.clone(),
                    PendingRecon {
                        detected_at: now,
                        column_at_detection: task.status,
                    },
                );
                return;
            }
            Some(pending) => *pending,
        };

        if now.duration_since(pending.detected_at) < self.config.grace_period {
            return;
        }

        self.pending.remove(&task.id);
        self.classify(task, pending);
    }

    /// Grace period elapsed: decide what the dead window meant. The task is
    /// re-read first; the agent may have moved it (or requested a reset)
    /// after the liveness snapshot was taken.
    fn classify(&mut self, task: &Task, pending: PendingRecon) {
        let mut fresh = match self.service.get_task(&task.id) {
            Ok(task) => task,
            Err(err) => {
                warn!(event = "reconcile_reread_failed", task = %task.short_id(), error = %err);
                return;
            }
        };

        // Baseline column: prefer the persistent spawn marker, fall back to
        // the column observed when the window death was first seen.
        let baseline = fresh
            .agent_spawned_status
            .parse::<TaskStatus>()
            .unwrap_or(pending.column_at_detection);

        let event = if fresh.reset_requested {
            fresh.reset_requested = false;
            fresh.agent_status = AgentStatus::Idle;
            SupervisorEvent::AgentReset {
                task_id: fresh.id.clone(),
                title: fresh.title.clone(),
            }
        } else if fresh.status != baseline {
            fresh.agent_status = AgentStatus::Completed;
            SupervisorEvent::AgentCompleted {
                task_id: fresh.id.clone(),
                title: fresh.title.clone(),
            }
        } else {
            fresh.agent_status = AgentStatus::Error;
            SupervisorEvent::AgentCrashed {
                task_id: fresh.id.clone(),
                title: fresh.title.clone(),
            }
        };

        fresh.agent_started_at = String::new();
        fresh.agent_spawned_status = String::new();
        if let Err(err) = self.service.update_task(&fresh) {
            warn!(event = "reconcile_update_failed", task = %fresh.short_id(), error = %err);
            return;
        }
        info!(
            event = "agent_classified",
            task = %fresh.short_id(),
            outcome = %fresh.agent_status,
        );
        let _ = self.events.try_send(event);
    }

    fn respawn(&mut self, task: &Task) {
        let Some(runner) = get_runner(&task.agent_name).filter(|r| r.available()) else {
            let mut fresh = task.clone();
            fresh.agent_status = AgentStatus::Error;
            fresh.agent_started_at = String::new();
            fresh.agent_spawned_status = String::new();
            if let Err(err) = self.service.update_task(&fresh) {
                warn!(event = "respawn_update_failed", task = %task.short_id(), error = %err);
            }
            warn!(event = "respawn_runner_missing", task = %task.short_id(), runner = %task.agent_name);
            return;
        };

        // Reset any external loop state so the fresh agent runs one pass.
        if let Err(err) = deactivate_loop_state(task) {
            warn!(event = "loop_state_reset_failed", task = %task.short_id(), error = %err);
        }

        match spawn(&self.service, &self.mux, task, runner) {
            Ok(()) => {
                let _ = self.events.try_send(SupervisorEvent::AgentRespawned {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    column: task.status,
                });
            }
            Err(err) => {
                warn!(event = "respawn_failed", task = %task.short_id(), error = %err);
            }
        }
    }

    fn start_enrichment(&mut self, task: &Task) {
        let Some(runner) =
            get_runner(&self.config.enrichment_runner).filter(|r| r.available())
        else {
            self.mark_enrichment(task, EnrichmentStatus::Skipped);
            let _ = self.events.try_send(SupervisorEvent::EnrichmentSkipped {
                task_id: task.id.clone(),
            });
            return;
        };

        match spawn_enrichment(&self.service, &self.mux, task, runner) {
            Ok(()) => {
                let _ = self.events.try_send(SupervisorEvent::EnrichmentStarted {
                    task_id: task.id.clone(),
                });
            }
            Err(crate::spawn::SpawnError::EnrichmentUnsupported(_)) => {
                self.mark_enrichment(task, EnrichmentStatus::Skipped);
                let _ = self.events.try_send(SupervisorEvent::EnrichmentSkipped {
                    task_id: task.id.clone(),
                });
            }
            Err(err) => {
                warn!(event = "enrichment_spawn_failed", task = %task.short_id(), error = %err);
                self.mark_enrichment(task, EnrichmentStatus::Error);
                let _ = self.events.try_send(SupervisorEvent::EnrichmentFailed {
                    task_id: task.id.clone(),
                });
            }
        }
    }

    /// An enriching task whose window died and stayed dead past the grace
    /// period never reported back: the enrichment agent failed. The agent
    /// reports success itself by setting the status to done before exiting.
    fn reconcile_enrichment(&mut self, windows: &HashSet<String>, task: &Task, now: Instant) {
        let name = enrichment_window_name(task);
        if windows.contains(&name) {
            self.enrich_pending.remove(&task.id);
            return;
        }

        let detected_at = *self
            .enrich_pending
            .entry(task.id.clone())
            .or_insert(now);
        if now.duration_since(detected_at) < self.config.grace_period {
            return;
        }
        self.enrich_pending.remove(&task.id);

        // Re-read: the agent may have marked the pass done while we waited.
        match self.service.get_task(&task.id) {
            Ok(fresh) if fresh.enrichment_status == EnrichmentStatus::Enriching => {
                self.mark_enrichment(&fresh, EnrichmentStatus::Error);
                let _ = self.events.try_send(SupervisorEvent::EnrichmentFailed {
                    task_id: fresh.id,
                });
            }
            Ok(_) => {}
            Err(err) => {
                warn!(event = "enrichment_reread_failed", task = %task.short_id(), error = %err);
            }
        }
    }

    fn mark_enrichment(&self, task: &Task, status: EnrichmentStatus) {
        let patch = TaskPatch {
            enrichment_status: Some(status),
            ..Default::default()
        };
        if let Err(err) = self.service.update_task_fields(&task.id, &patch) {
            warn!(event = "enrichment_mark_failed", task = %task.short_id(), error = %err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewboard_store::Store;
    use std::sync::Arc;

    const GRACE: Duration = Duration::from_millis(50);

    fn supervisor() -> (Supervisor, mpsc::Receiver<SupervisorEvent>, BoardService) {
        let service = BoardService::new(Arc::new(Store::open_in_memory().expect("store")));
        let config = SupervisorConfig {
            poll_interval: Duration::from_millis(10),
            grace_period: GRACE,
            // A runner id that never resolves keeps enrichment out of the
            // window manager during unit tests.
            enrichment_runner: "none".to_string(),
        };
        let (sup, events) = Supervisor::new(service.clone(), WindowManager::new(), config);
        (sup, events, service)
    }

    /// Seed one active agent as if spawned into `column`.
    fn seed_active(service: &BoardService, column: TaskStatus) -> Task {
        let task = service.create_task("supervised", "").expect("create");
        service.move_task(&task.id, column).expect("move");
        let mut task = service.get_task(&task.id).expect("get");
        task.agent_name = "claude".to_string();
        task.agent_status = AgentStatus::Active;
        task.agent_spawned_status = column.as_str().to_string();
        task.agent_started_at = chrono::Utc::now().to_rfc3339();
        service.update_task(&task).expect("update");
        service.get_task(&task.id).expect("reread")
    }

    fn tick(sup: &mut Supervisor, service: &BoardService, windows: &HashSet<String>, now: Instant) {
        let tasks = service.list_tasks().expect("list");
        sup.tick_with_windows(windows, &tasks, now);
    }

    #[test]
    fn live_window_keeps_agent_active() {
        let (mut sup, _events, service) = supervisor();
        let task = seed_active(&service, TaskStatus::Planning);

        let windows: HashSet<String> = [window_name(&task)].into_iter().collect();
        let t0 = Instant::now();
        tick(&mut sup, &service, &windows, t0);
        tick(&mut sup, &service, &windows, t0 + GRACE * 3);

        let task = service.get_task(&task.id).expect("get");
        assert_eq!(task.agent_status, AgentStatus::Active);
    }

    #[test]
    fn agent_that_moved_the_task_is_classified_completed() {
        let (mut sup, mut events, service) = supervisor();
        let task = seed_active(&service, TaskStatus::Planning);

        let dead = HashSet::new();
        let t0 = Instant::now();
        // First tick: window observed dead, grace period begins, no DB write.
        tick(&mut sup, &service, &dead, t0);
        assert_eq!(
            service.get_task(&task.id).expect("get").agent_status,
            AgentStatus::Active
        );

        // The agent moves the task during the grace period, then stays gone.
        service.move_task(&task.id, TaskStatus::InProgress).expect("agent move");

        tick(&mut sup, &service, &dead, t0 + GRACE + Duration::from_millis(1));

        let task = service.get_task(&task.id).expect("get");
        assert_eq!(task.agent_status, AgentStatus::Completed);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.agent_spawned_status, "");
        assert_eq!(task.agent_started_at, "");
        assert!(matches!(
            events.try_recv().expect("event"),
            SupervisorEvent::AgentCompleted { .. }
        ));
    }

    #[test]
    fn agent_that_stayed_put_is_classified_crashed() {
        let (mut sup, mut events, service) = supervisor();
        let task = seed_active(&service, TaskStatus::Planning);

        let dead = HashSet::new();
        let t0 = Instant::now();
        tick(&mut sup, &service, &dead, t0);
        tick(&mut sup, &service, &dead, t0 + GRACE + Duration::from_millis(1));

        let task = service.get_task(&task.id).expect("get");
        assert_eq!(task.agent_status, AgentStatus::Error);
        assert_eq!(task.status, TaskStatus::Planning);
        assert!(matches!(
            events.try_recv().expect("event"),
            SupervisorEvent::AgentCrashed { .. }
        ));
    }

    #[test]
    fn reset_request_wins_over_classification() {
        let (mut sup, mut events, service) = supervisor();
        let task = seed_active(&service, TaskStatus::Planning);

        let mut with_reset = service.get_task(&task.id).expect("get");
        with_reset.reset_requested = true;
        service.update_task(&with_reset).expect("update");

        let dead = HashSet::new();
        let t0 = Instant::now();
        tick(&mut sup, &service, &dead, t0);
        tick(&mut sup, &service, &dead, t0 + GRACE + Duration::from_millis(1));

        let task = service.get_task(&task.id).expect("get");
        assert_eq!(task.agent_status, AgentStatus::Idle);
        assert!(!task.reset_requested);
        assert_eq!(task.agent_spawned_status, "");
        assert_eq!(task.agent_started_at, "");
        assert!(matches!(
            events.try_recv().expect("event"),
            SupervisorEvent::AgentReset { .. }
        ));
    }

    #[test]
    fn no_classification_inside_grace_period() {
        let (mut sup, _events, service) = supervisor();
        let task = seed_active(&service, TaskStatus::Planning);

        let dead = HashSet::new();
        let t0 = Instant::now();
        tick(&mut sup, &service, &dead, t0);
        tick(&mut sup, &service, &dead, t0 + GRACE / 2);

        assert_eq!(
            service.get_task(&task.id).expect("get").agent_status,
            AgentStatus::Active
        );
    }

    #[test]
    fn window_revival_clears_the_pending_entry() {
        let (mut sup, _events, service) = supervisor();
        let task = seed_active(&service, TaskStatus::Planning);

        let dead = HashSet::new();
        let live: HashSet<String> = [window_name(&task)].into_iter().collect();
        let t0 = Instant::now();
        tick(&mut sup, &service, &dead, t0);
        // Window back before grace elapsed (e.g. slow listing glitch).
        tick(&mut sup, &service, &live, t0 + GRACE / 2);
        // Dead again: the grace period must restart, not carry over.
        tick(&mut sup, &service, &dead, t0 + GRACE);
        tick(&mut sup, &service, &dead, t0 + GRACE + GRACE / 2);

        assert_eq!(
            service.get_task(&task.id).expect("get").agent_status,
            AgentStatus::Active
        );
    }

    #[test]
    fn spawned_status_beats_column_at_detection_as_baseline() {
        let (mut sup, mut events, service) = supervisor();
        // Spawned into planning, but the supervisor first observes the dead
        // window only after the agent already moved the task to review.
        let task = seed_active(&service, TaskStatus::Planning);
        service.move_task(&task.id, TaskStatus::Review).expect("move");

        let dead = HashSet::new();
        let t0 = Instant::now();
        tick(&mut sup, &service, &dead, t0);
        tick(&mut sup, &service, &dead, t0 + GRACE + Duration::from_millis(1));

        // column_at_detection was review (equal to the current column), but
        // the persistent baseline says planning: the agent moved the task
        // and completed its stage.
        let task = service.get_task(&task.id).expect("get");
        assert_eq!(task.agent_status, AgentStatus::Completed);
        assert!(matches!(
            events.try_recv().expect("event"),
            SupervisorEvent::AgentCompleted { .. }
        ));
    }

    #[test]
    fn missing_enrichment_runner_marks_skipped() {
        let (mut sup, mut events, service) = supervisor();
        let task = service.create_task("enrich me", "").expect("create");
        service
            .update_task_fields(
                &task.id,
                &TaskPatch {
                    enrichment_status: Some(EnrichmentStatus::Pending),
                    ..Default::default()
                },
            )
            .expect("mark pending");

        let windows = HashSet::new();
        tick(&mut sup, &service, &windows, Instant::now());

        let task = service.get_task(&task.id).expect("get");
        assert_eq!(task.enrichment_status, EnrichmentStatus::Skipped);
        assert!(matches!(
            events.try_recv().expect("event"),
            SupervisorEvent::EnrichmentSkipped { .. }
        ));
    }

    #[test]
    fn dead_enrichment_window_is_marked_error_after_grace() {
        let (mut sup, mut events, service) = supervisor();
        let task = service.create_task("enriching", "").expect("create");
        service
            .update_task_fields(
                &task.id,
                &TaskPatch {
                    enrichment_status: Some(EnrichmentStatus::Enriching),
                    ..Default::default()
                },
            )
            .expect("mark enriching");

        let dead = HashSet::new();
        let t0 = Instant::now();
        tick(&mut sup, &service, &dead, t0);
        tick(&mut sup, &service, &dead, t0 + GRACE + Duration::from_millis(1));

        let task = service.get_task(&task.id).expect("get");
        assert_eq!(task.enrichment_status, EnrichmentStatus::Error);
        assert!(matches!(
            events.try_recv().expect("event"),
            SupervisorEvent::EnrichmentFailed { .. }
        ));
    }

    #[test]
    fn deleted_task_drops_its_pending_entry() {
        let (mut sup, _events, service) = supervisor();
        let task = seed_active(&service, TaskStatus::Planning);

        let dead = HashSet::new();
        let t0 = Instant::now();
        tick(&mut sup, &service, &dead, t0);
        service.delete_task(&task.id).expect("delete");
        // Ticks after deletion must not resurrect or error on the task.
        tick(&mut sup, &service, &dead, t0 + GRACE * 2);
        assert!(sup.pending.is_empty());
    }
}
