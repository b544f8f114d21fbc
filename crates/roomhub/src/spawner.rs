//! Spawner collaborator.
//!
//! A spawner launches room-server processes and hands each one a task id
//! plus a one-time code. The launched process proves who it is with
//! [`Spawner::register_spawned_process`] and reports back with
//! [`SpawnTask::finalize`] once its room is registered.
//!
//! [`MasterSpawner`] does both over the master connection. The master
//! keeps the matching bookkeeping in [`SpawnTaskTable`].

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use roomhub_peer::{Peer, PeerError};
use roomhub_protocol::{Message, PeerId};

use crate::config::SpawnTaskArgs;
use crate::error::SpawnError;

// ---------------------------------------------------------------------------
// Room-server side
// ---------------------------------------------------------------------------

/// A registered spawn task, finalized once.
pub trait SpawnTask: Send + 'static {
    fn task_id(&self) -> u64;

    /// Reports the task as done with `result` properties.
    fn finalize(
        self,
        result: BTreeMap<String, String>,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;
}

/// Process-side view of the spawner.
pub trait Spawner: Send + Sync + 'static {
    type Task: SpawnTask;

    /// Whether this process was launched by a spawner.
    fn is_spawned_process(&self) -> bool;

    /// Claims spawn task `task_id` with its one-time code.
    fn register_spawned_process(
        &self,
        master: &Arc<Peer>,
        task_id: u64,
        unique_code: &str,
    ) -> impl Future<Output = Result<Self::Task, PeerError>> + Send;
}

/// [`Spawner`] that talks to the master this room server is connected to.
#[derive(Debug, Clone, Default)]
pub struct MasterSpawner {
    spawned: bool,
}

impl MasterSpawner {
    /// A process counts as spawned when it was given a task id and code.
    pub fn new(spawn_task: Option<&SpawnTaskArgs>) -> Self {
        Self {
            spawned: spawn_task.is_some(),
        }
    }
}

impl Spawner for MasterSpawner {
    type Task = MasterSpawnTask;

    fn is_spawned_process(&self) -> bool {
        self.spawned
    }

    async fn register_spawned_process(
        &self,
        master: &Arc<Peer>,
        task_id: u64,
        unique_code: &str,
    ) -> Result<MasterSpawnTask, PeerError> {
        let reply = master
            .request(Message::RegisterSpawnedProcess {
                task_id,
                unique_code: unique_code.to_string(),
            })
            .await?
            .into_result()?;
        match reply {
            Message::Ack => Ok(MasterSpawnTask {
                task_id,
                master: Arc::clone(master),
            }),
            other => Err(PeerError::UnexpectedResponse(other.kind())),
        }
    }
}

/// Spawn task registered with the master.
#[derive(Debug)]
pub struct MasterSpawnTask {
    task_id: u64,
    master: Arc<Peer>,
}

impl SpawnTask for MasterSpawnTask {
    fn task_id(&self) -> u64 {
        self.task_id
    }

    async fn finalize(self, result: BTreeMap<String, String>) -> Result<(), PeerError> {
        self.master
            .request(Message::CompleteSpawnProcess {
                task_id: self.task_id,
                properties: result,
            })
            .await?
            .into_result()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Master side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TaskEntry {
    unique_code: String,
    registered_by: Option<PeerId>,
    result: Option<BTreeMap<String, String>>,
}

/// Spawn tasks the master expects processes to claim.
#[derive(Debug, Default)]
pub struct SpawnTaskTable {
    tasks: HashMap<u64, TaskEntry>,
}

impl SpawnTaskTable {
    /// Announces a task a process will be launched for.
    pub fn expect(&mut self, task_id: u64, unique_code: impl Into<String>) {
        self.tasks.insert(
            task_id,
            TaskEntry {
                unique_code: unique_code.into(),
                registered_by: None,
                result: None,
            },
        );
    }

    /// A launched process claims its task.
    pub fn register(
        &mut self,
        task_id: u64,
        unique_code: &str,
        peer_id: PeerId,
    ) -> Result<(), SpawnError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SpawnError::UnknownTask(task_id))?;
        if task.unique_code != unique_code {
            return Err(SpawnError::InvalidCode(task_id));
        }
        if task.registered_by.is_some() {
            return Err(SpawnError::AlreadyRegistered(task_id));
        }
        task.registered_by = Some(peer_id);
        Ok(())
    }

    /// The process that claimed the task finishes it.
    pub fn complete(
        &mut self,
        task_id: u64,
        peer_id: PeerId,
        result: BTreeMap<String, String>,
    ) -> Result<(), SpawnError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SpawnError::UnknownTask(task_id))?;
        if task.registered_by != Some(peer_id) {
            return Err(SpawnError::NotRegistered(task_id));
        }
        task.result = Some(result);
        Ok(())
    }

    pub fn is_completed(&self, task_id: u64) -> bool {
        self.tasks
            .get(&task_id)
            .is_some_and(|task| task.result.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_checks_code_and_claims_once() {
        let mut table = SpawnTaskTable::default();
        table.expect(1, "abc");

        assert_eq!(
            table.register(1, "nope", PeerId(5)),
            Err(SpawnError::InvalidCode(1))
        );
        assert_eq!(table.register(1, "abc", PeerId(5)), Ok(()));
        assert_eq!(
            table.register(1, "abc", PeerId(6)),
            Err(SpawnError::AlreadyRegistered(1))
        );
        assert_eq!(
            table.register(2, "abc", PeerId(5)),
            Err(SpawnError::UnknownTask(2))
        );
    }

    #[test]
    fn test_only_claiming_process_completes_task() {
        let mut table = SpawnTaskTable::default();
        table.expect(1, "abc");
        table.register(1, "abc", PeerId(5)).unwrap();

        assert_eq!(
            table.complete(1, PeerId(6), BTreeMap::new()),
            Err(SpawnError::NotRegistered(1))
        );
        assert!(!table.is_completed(1));
        table.complete(1, PeerId(5), BTreeMap::new()).unwrap();
        assert!(table.is_completed(1));
    }

    #[test]
    fn test_master_spawner_is_spawned_with_task_args() {
        assert!(!MasterSpawner::new(None).is_spawned_process());
        let args = SpawnTaskArgs {
            task_id: 1,
            unique_code: "x".into(),
        };
        assert!(MasterSpawner::new(Some(&args)).is_spawned_process());
    }
}
