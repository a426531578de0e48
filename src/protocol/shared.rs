//! Shared handle to the state machine.
//!
//! Writers are serialized behind one lock; readers only ever observe
//! committed state because every operation commits or rolls back before the
//! write guard is released.

use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::protocol::events::EventLog;
use crate::protocol::operations::{ProtocolOperation, Receipt};
use crate::protocol::state_machine::ProtocolStateMachine;

/// Cloneable, thread-safe handle to one protocol instance
#[derive(Debug, Clone)]
pub struct SharedProtocol {
    inner: Arc<RwLock<ProtocolStateMachine>>,
}

impl SharedProtocol {
    /// Wrap a state machine
    pub fn new(machine: ProtocolStateMachine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(machine)),
        }
    }

    /// Advance the injected clock
    pub fn begin_block(&self, block_height: u64, timestamp: u64) -> Result<()> {
        self.inner
            .write()
            .map_err(|_| Error::Lock)?
            .begin_block(block_height, timestamp)
    }

    /// Close the current block
    pub fn end_block(&self) -> Result<EventLog> {
        Ok(self.inner.write().map_err(|_| Error::Lock)?.end_block())
    }

    /// Apply one operation
    pub fn submit(&self, operation: ProtocolOperation) -> Result<Receipt> {
        self.inner.write().map_err(|_| Error::Lock)?.execute(operation)
    }

    /// Run a read-only query against committed state
    pub fn read<R>(&self, query: impl FnOnce(&ProtocolStateMachine) -> R) -> Result<R> {
        let guard = self.inner.read().map_err(|_| Error::Lock)?;
        Ok(query(&guard))
    }

    /// Encode the committed state
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        self.read(|machine| machine.to_bytes())?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SystemConfig;
    use crate::utils::address::Address;
    use crate::utils::math::Wad;
    use std::thread;

    #[test]
    fn test_concurrent_writers_are_serialized() {
        let shared = SharedProtocol::new(ProtocolStateMachine::new(&SystemConfig::default()).unwrap());
        shared.begin_block(1, 100).unwrap();
        let gov = shared.read(|m| m.addresses().governance).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        shared
                            .submit(ProtocolOperation::MintProtocolToken {
                                caller: gov,
                                to: Address::derive(&format!("holder-{}", i)),
                                amount: Wad::from_integer(1),
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let supply = shared.read(|m| m.protocol_token().total_supply()).unwrap();
        assert_eq!(supply, Wad::from_integer(20));
        assert_eq!(shared.read(|m| m.operations_executed()).unwrap(), 20);
        assert_eq!(shared.end_block().unwrap().len(), 20);
    }
}
