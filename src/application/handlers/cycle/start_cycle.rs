//! StartCycleHandler - Command handler for opening a group's order cycle.

use std::sync::Arc;

use crate::config::CycleConfig;
use crate::domain::cycle::OrderCycle;
use crate::domain::foundation::{DomainError, ErrorCode, GroupId, Timestamp};
use crate::ports::{CycleStore, GroupDirectory};

/// Command to start a new order cycle for a group.
#[derive(Debug, Clone)]
pub struct StartCycleCommand {
    /// Group to open the cycle for.
    pub group_id: GroupId,
}

/// Result of starting (or rejoining) a group's cycle.
#[derive(Debug, Clone)]
pub struct StartCycleResult {
    /// The group's open cycle.
    pub cycle: OrderCycle,
    /// True if this call opened the cycle; false if the group already
    /// had one and it was returned instead.
    pub created: bool,
}

/// Error type for cycle start.
#[derive(Debug)]
pub enum StartCycleError {
    /// Group not found in the directory.
    GroupNotFound(GroupId),
    /// Domain error.
    Domain(DomainError),
}

impl std::fmt::Display for StartCycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartCycleError::GroupNotFound(id) => write!(f, "Group not found: {}", id),
            StartCycleError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for StartCycleError {}

impl From<DomainError> for StartCycleError {
    fn from(err: DomainError) -> Self {
        StartCycleError::Domain(err)
    }
}

/// Handler for starting order cycles.
pub struct StartCycleHandler {
    cycle_store: Arc<dyn CycleStore>,
    group_directory: Arc<dyn GroupDirectory>,
    config: CycleConfig,
}

impl StartCycleHandler {
    pub fn new(
        cycle_store: Arc<dyn CycleStore>,
        group_directory: Arc<dyn GroupDirectory>,
        config: CycleConfig,
    ) -> Self {
        Self {
            cycle_store,
            group_directory,
            config,
        }
    }

    pub async fn handle(
        &self,
        cmd: StartCycleCommand,
    ) -> Result<StartCycleResult, StartCycleError> {
        // 1. Verify the group exists
        self.group_directory
            .members(cmd.group_id)
            .await?
            .ok_or(StartCycleError::GroupNotFound(cmd.group_id))?;

        // 2. At most one open cycle per group; rejoin the existing one
        if let Some(open) = self.cycle_store.find_open_by_group(cmd.group_id).await? {
            return Ok(StartCycleResult {
                cycle: open,
                created: false,
            });
        }

        // 3. Open the cycle, collecting until the configured window ends
        let now = Timestamp::now();
        let cycle = OrderCycle::start(
            cmd.group_id,
            now,
            now.add_hours(i64::from(self.config.collecting_hours)),
            self.config.default_min_quantity,
        );

        // 4. Persist. The store re-checks the one-open-cycle rule, so a
        //    racing start resolves to whichever cycle landed first.
        match self.cycle_store.insert(cycle.clone()).await {
            Ok(()) => {}
            Err(err) if err.code == ErrorCode::OpenCycleExists => {
                let winner = self.cycle_store.find_open_by_group(cmd.group_id).await?;
                return match winner {
                    Some(open) => Ok(StartCycleResult {
                        cycle: open,
                        created: false,
                    }),
                    None => Err(err.into()),
                };
            }
            Err(err) => return Err(err.into()),
        }

        // 5. Point the group at its new current cycle
        self.group_directory
            .set_current_cycle(cmd.group_id, Some(cycle.id()))
            .await?;

        Ok(StartCycleResult {
            cycle,
            created: true,
        })
    }
}
