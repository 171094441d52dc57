use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tasklog_core::{Error, Orchestrator, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::message::{Reply, SyncMessage, SyncRequest, Ticket};

/// Receiving end of the completion messages.
pub type Inbox = mpsc::UnboundedReceiver<SyncMessage>;

struct Job {
    ticket: Ticket,
    request: SyncRequest,
}

/// Runs storage operations on a single background worker.
///
/// Requests against the storage root are executed one at a time in
/// submission order; the worker owns the root while a request runs.
pub struct SyncService {
    jobs: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    mutations: Arc<AtomicUsize>,
}

impl SyncService {
    /// Spawns the worker. Must be called from within a tokio runtime.
    pub fn start(orchestrator: Orchestrator) -> (Self, Inbox) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let mutations = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run_worker(
            Arc::new(orchestrator),
            job_rx,
            msg_tx,
            Arc::clone(&pending),
            Arc::clone(&mutations),
        ));
        info!("Sync worker started");

        (
            Self {
                jobs: job_tx,
                pending,
                mutations,
            },
            msg_rx,
        )
    }

    /// Queues the request behind any outstanding one.
    pub fn dispatch(&self, request: SyncRequest) -> Result<Ticket> {
        if request.kind().is_mutation() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.enqueue(request)
    }

    /// Like [`dispatch`](Self::dispatch) but refuses an Init, Commit, Pull
    /// or Push while another of those is queued or running. Read-only
    /// requests are always queued.
    pub fn try_dispatch(&self, request: SyncRequest) -> Result<Ticket> {
        if !request.kind().is_mutation() {
            return self.dispatch(request);
        }
        self.mutations
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::Busy)?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.enqueue(request)
    }

    pub fn is_busy(&self) -> bool {
        self.pending() > 0
    }

    /// Requests queued or in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn enqueue(&self, request: SyncRequest) -> Result<Ticket> {
        let ticket = Uuid::new_v4();
        let kind = request.kind();
        debug!("Queueing {} as {}", kind, ticket);
        if self.jobs.send(Job { ticket, request }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            if kind.is_mutation() {
                self.mutations.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(Error::WorkerClosed);
        }
        Ok(ticket)
    }
}

async fn run_worker(
    orchestrator: Arc<Orchestrator>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    inbox: mpsc::UnboundedSender<SyncMessage>,
    pending: Arc<AtomicUsize>,
    mutations: Arc<AtomicUsize>,
) {
    while let Some(Job { ticket, request }) = jobs.recv().await {
        let kind = request.kind();
        let orchestrator = Arc::clone(&orchestrator);

        let reply = match tokio::task::spawn_blocking(move || execute(&orchestrator, request)).await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!("{} {} did not complete: {}", kind, ticket, e);
                Reply::Fatal(format!("{} did not complete: {}", kind, e))
            }
        };

        if kind.is_mutation() {
            mutations.fetch_sub(1, Ordering::SeqCst);
        }
        pending.fetch_sub(1, Ordering::SeqCst);
        let message = SyncMessage {
            ticket,
            kind,
            reply,
            finished_at: Utc::now(),
        };
        if inbox.send(message).is_err() {
            debug!("Inbox closed, discarding result of {}", ticket);
        }
    }
    debug!("Sync worker stopped");
}

fn execute(orchestrator: &Orchestrator, request: SyncRequest) -> Reply {
    let result = match request {
        SyncRequest::Init => orchestrator.init().map(Reply::Outcome),
        SyncRequest::Commit(changes) => orchestrator.commit(&changes).map(Reply::Outcome),
        SyncRequest::Pull => orchestrator.pull().map(Reply::Outcome),
        SyncRequest::Push => orchestrator.push().map(Reply::Outcome),
        SyncRequest::CurrentUser => Ok(Reply::Identity(orchestrator.current_user())),
        SyncRequest::AllContributors => Ok(Reply::Contributors(orchestrator.all_contributors())),
        SyncRequest::History(limit) => orchestrator.history(limit).map(Reply::History),
    };
    result.unwrap_or_else(|e| {
        error!("Unrecoverable storage error: {}", e);
        Reply::Fatal(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RequestKind;
    use std::io;
    use std::path::Path;
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;
    use tasklog_core::{
        Backend, ChangeKind, ChangeSet, CommandOutput, CommandRunner, Mutation, OperationOutcome,
        ScriptedRunner, Sentinel, Settings, Stage, StaticConfig,
    };
    use tempfile::TempDir;

    /// Blocks the first command until released.
    struct GatedRunner {
        gate: Mutex<Option<std_mpsc::Receiver<()>>>,
        inner: ScriptedRunner,
    }

    impl CommandRunner for GatedRunner {
        fn run(&self, cwd: &Path, program: &str, args: &[String]) -> io::Result<CommandOutput> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            self.inner.run(cwd, program, args)
        }
    }

    fn orchestrator(dir: &TempDir, runner: Arc<dyn CommandRunner>) -> Orchestrator {
        let settings = Settings::new(dir.path(), Backend::Git);
        Orchestrator::new(Arc::new(StaticConfig::new(settings)), runner)
    }

    fn create(name: &str) -> ChangeSet {
        ChangeSet::single(Mutation::new(ChangeKind::Create, format!("{}.json", name), name))
            .unwrap()
    }

    #[tokio::test]
    async fn test_each_request_gets_one_message() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptedRunner::new()
            .on(&["git", "config", "--get", "user.email"], CommandOutput::success("ada@example.com\n"));
        let (service, mut inbox) = SyncService::start(orchestrator(&dir, Arc::new(runner)));

        let init = service.dispatch(SyncRequest::Init).unwrap();
        let user = service.dispatch(SyncRequest::CurrentUser).unwrap();

        let first = inbox.recv().await.unwrap();
        assert_eq!(first.ticket, init);
        assert_eq!(first.kind, RequestKind::Init);
        assert_eq!(first.outcome(), Some(&OperationOutcome::Done));
        assert!(Sentinel::exists(dir.path()));

        let second = inbox.recv().await.unwrap();
        assert_eq!(second.ticket, user);
        match second.reply {
            Reply::Identity(identity) => assert_eq!(identity.email, "ada@example.com"),
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(!service.is_busy());
    }

    #[tokio::test]
    async fn test_second_request_deferred_or_rejected_while_busy() {
        let dir = TempDir::new().unwrap();
        let (release, gate) = std_mpsc::channel();
        let runner = GatedRunner {
            gate: Mutex::new(Some(gate)),
            inner: ScriptedRunner::new().on(&["git", "diff"], CommandOutput::success("a.json\0")),
        };
        let (service, mut inbox) = SyncService::start(orchestrator(&dir, Arc::new(runner)));

        let first = service.try_dispatch(SyncRequest::Commit(create("a"))).unwrap();
        assert!(service.is_busy());
        assert!(matches!(
            service.try_dispatch(SyncRequest::Commit(create("b"))),
            Err(Error::Busy)
        ));
        let second = service.dispatch(SyncRequest::Commit(create("c"))).unwrap();
        assert_eq!(service.pending(), 2);

        release.send(()).unwrap();

        let done = inbox.recv().await.unwrap();
        assert_eq!(done.ticket, first);
        assert!(done.outcome().unwrap().is_done());
        let done = inbox.recv().await.unwrap();
        assert_eq!(done.ticket, second);
        assert!(done.outcome().unwrap().is_done());
        assert_eq!(service.pending(), 0);
    }

    #[tokio::test]
    async fn test_reads_are_not_rejected_while_committing() {
        let dir = TempDir::new().unwrap();
        let (release, gate) = std_mpsc::channel();
        let runner = GatedRunner {
            gate: Mutex::new(Some(gate)),
            inner: ScriptedRunner::new().on(&["git", "diff"], CommandOutput::success("a.json\0")),
        };
        let (service, mut inbox) = SyncService::start(orchestrator(&dir, Arc::new(runner)));

        let commit = service.try_dispatch(SyncRequest::Commit(create("a"))).unwrap();
        let user = service.try_dispatch(SyncRequest::CurrentUser).unwrap();
        let history = service.try_dispatch(SyncRequest::History(5)).unwrap();
        assert!(matches!(service.try_dispatch(SyncRequest::Push), Err(Error::Busy)));
        assert_eq!(service.pending(), 3);

        release.send(()).unwrap();

        let tickets: Vec<Ticket> = vec![
            inbox.recv().await.unwrap().ticket,
            inbox.recv().await.unwrap().ticket,
            inbox.recv().await.unwrap().ticket,
        ];
        assert_eq!(tickets, vec![commit, user, history]);
        assert!(service.try_dispatch(SyncRequest::Push).is_ok());
    }

    #[tokio::test]
    async fn test_failure_is_delivered_as_message() {
        let dir = TempDir::new().unwrap();
        Sentinel::create(dir.path(), Backend::Git).unwrap();
        let runner = ScriptedRunner::new()
            .on(&["git", "diff"], CommandOutput::success("a.json\0"))
            .on(&["git", "commit"], CommandOutput::failure(128, "Author identity unknown"));
        let (service, mut inbox) = SyncService::start(orchestrator(&dir, Arc::new(runner)));

        service.dispatch(SyncRequest::Commit(create("a"))).unwrap();
        let message = inbox.recv().await.unwrap();

        let failure = message.outcome().unwrap().failure().unwrap();
        assert_eq!(failure.stage, Stage::Commit);
        assert_eq!(failure.raw_output, "Author identity unknown");
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal_reply() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::new(dir.path().join("gone"), Backend::Git);
        let orch = Orchestrator::new(
            Arc::new(StaticConfig::new(settings)),
            Arc::new(ScriptedRunner::new()),
        );
        let (service, mut inbox) = SyncService::start(orch);

        service.dispatch(SyncRequest::Push).unwrap();
        let message = inbox.recv().await.unwrap();

        assert!(matches!(message.reply, Reply::Fatal(ref m) if m.contains("gone")));
    }

    #[tokio::test]
    async fn test_dropped_inbox_does_not_stop_work() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let (service, inbox) =
            SyncService::start(orchestrator(&dir, Arc::clone(&runner) as Arc<dyn CommandRunner>));
        drop(inbox);

        service.dispatch(SyncRequest::Init).unwrap();
        while service.is_busy() {
            tokio::task::yield_now().await;
        }
        assert!(Sentinel::exists(dir.path()));
        assert!(runner.ran("git init"));
    }
}
