//! Manager Addressing
//!
//! Which manager replica a node sends its requests to. Failover is a unilateral local
//! transition triggered by a death notice, never a negotiated handoff.

use crate::error::{IvyError, Result};
use crate::protocol::types::ManagerId;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Addressing {
    Primary,
    Backup,
}

#[derive(Debug, Clone)]
pub struct ManagerRoute {
    primary: ManagerId,
    backup: ManagerId,
    addressing: Addressing,
    failovers: u64,
}

impl ManagerRoute {
    pub fn new(primary: ManagerId, backup: ManagerId) -> Self {
        Self {
            primary,
            backup,
            addressing: Addressing::Primary,
            failovers: 0,
        }
    }

    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    pub fn failovers(&self) -> u64 {
        self.failovers
    }

    pub fn current(&self) -> ManagerId {
        match self.addressing {
            Addressing::Primary => self.primary,
            Addressing::Backup => self.backup,
        }
    }

    pub fn standby(&self) -> ManagerId {
        match self.addressing {
            Addressing::Primary => self.backup,
            Addressing::Backup => self.primary,
        }
    }

    /// Switches to the standby if `dead` is the manager currently addressed.
    ///
    /// A notice naming the standby is a repeated notice for a failover that already
    /// happened; swapping again would point the node back at the dead replica, so it
    /// is rejected and addressing stays put.
    pub fn on_peer_death(&mut self, dead: ManagerId) -> Result<ManagerId> {
        if dead != self.primary && dead != self.backup {
            return Err(IvyError::ManagerNotFound(dead));
        }

        let current = self.current();
        if dead != current {
            return Err(IvyError::StaleDeathNotice { dead, current });
        }

        self.addressing = match self.addressing {
            Addressing::Primary => Addressing::Backup,
            Addressing::Backup => Addressing::Primary,
        };
        self.failovers += 1;
        Ok(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_addressing_primary() {
        let route = ManagerRoute::new(ManagerId(0), ManagerId(1));

        assert_eq!(route.addressing(), Addressing::Primary);
        assert_eq!(route.current(), ManagerId(0));
        assert_eq!(route.standby(), ManagerId(1));
    }

    #[test]
    fn test_death_of_current_switches_to_standby() {
        let mut route = ManagerRoute::new(ManagerId(0), ManagerId(1));

        let next = route.on_peer_death(ManagerId(0)).unwrap();

        assert_eq!(next, ManagerId(1));
        assert_eq!(route.addressing(), Addressing::Backup);
        assert_eq!(route.failovers(), 1);
    }

    #[test]
    fn test_repeated_notice_is_rejected() {
        let mut route = ManagerRoute::new(ManagerId(0), ManagerId(1));
        route.on_peer_death(ManagerId(0)).unwrap();

        let err = route.on_peer_death(ManagerId(0)).unwrap_err();

        assert!(matches!(
            err,
            IvyError::StaleDeathNotice {
                dead: ManagerId(0),
                current: ManagerId(1)
            }
        ));
        assert_eq!(route.current(), ManagerId(1));
    }

    #[test]
    fn test_alternating_deaths_swap_back() {
        let mut route = ManagerRoute::new(ManagerId(0), ManagerId(1));

        route.on_peer_death(ManagerId(0)).unwrap();
        let next = route.on_peer_death(ManagerId(1)).unwrap();

        assert_eq!(next, ManagerId(0));
        assert_eq!(route.addressing(), Addressing::Primary);
        assert_eq!(route.failovers(), 2);
    }

    #[test]
    fn test_unknown_manager_is_rejected() {
        let mut route = ManagerRoute::new(ManagerId(0), ManagerId(1));

        assert!(matches!(
            route.on_peer_death(ManagerId(7)),
            Err(IvyError::ManagerNotFound(ManagerId(7)))
        ));
    }
}
