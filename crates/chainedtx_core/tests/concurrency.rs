//! One coordinator shared across threads.

use chainedtx_core::{ChainCoordinator, ManagerRef, TransactionDefinition};
use chainedtx_testkit::prelude::*;
use std::sync::Arc;
use std::thread;

#[test]
fn independent_transactions_from_many_threads() {
    let journal = CallJournal::new();
    let managers: Vec<Arc<ScriptedManager>> = (0..3)
        .map(|i| Arc::new(ScriptedManager::new(resource_name(i), journal.clone())))
        .collect();
    let chain = Arc::new(
        ChainCoordinator::new(managers.iter().map(|m| Arc::clone(m) as ManagerRef)).unwrap(),
    );

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let chain = Arc::clone(&chain);
            thread::spawn(move || {
                for _ in 0..25 {
                    let status = chain.begin(&TransactionDefinition::default()).unwrap();
                    // Thread-local registry: every thread owns its synchronization.
                    assert!(status.is_new_synchronization());
                    if t % 2 == 0 {
                        chain.commit(status).unwrap();
                    } else {
                        chain.rollback(status).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in threads {
        handle.join().unwrap();
    }

    for i in 0..3 {
        let name = resource_name(i);
        assert_eq!(journal.count(&name, Op::Begin), 200);
        assert_eq!(journal.count(&name, Op::Commit), 100);
        assert_eq!(journal.count(&name, Op::Rollback), 100);
    }
}

#[test]
fn session_registries_do_not_interfere() {
    let a = Chain::new(2);
    let b = Chain::new(2);

    let status_a = a.begin(&TransactionDefinition::default()).unwrap();
    let status_b = b.begin(&TransactionDefinition::default()).unwrap();
    assert!(status_a.is_new_synchronization());
    assert!(status_b.is_new_synchronization());

    a.commit(status_a).unwrap();
    assert!(!a.synchronization_active());
    assert!(b.synchronization_active());

    b.rollback(status_b).unwrap();
    assert!(!b.synchronization_active());
}
