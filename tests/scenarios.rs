use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use batchwise::{batch_lookup_resolve, task, LookupError, LookupManager};

fn bulk_calls_log() -> Rc<RefCell<Vec<Vec<i32>>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[tokio::test]
async fn simple_lookup_resolves_through_a_single_element_batch() {
    let manager = LookupManager::new();
    let tasks = (0..1).map(|_| {
        task(async {
            manager
                .lookup_required(
                    1,
                    "user",
                    |keys: &[i32]| Ok(keys.iter().map(|k| (*k, format!("user-{k}"))).collect()),
                    0,
                )
                .await
        })
    });
    let results: Vec<_> = batch_lookup_resolve(tasks, &manager).collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap(), "user-1");
}

#[tokio::test]
async fn batch_size_boundary_flushes_exactly_at_threshold() {
    let manager = LookupManager::new();
    let calls = bulk_calls_log();
    let calls_for_fn = Rc::clone(&calls);
    let keys = vec![1, 2, 3];
    let tasks = keys.clone().into_iter().map(|k| {
        let calls = Rc::clone(&calls_for_fn);
        task(async move {
            manager
                .lookup_required(
                    k,
                    "boundary",
                    move |batch: &[i32]| {
                        calls.borrow_mut().push(batch.to_vec());
                        Ok(batch.iter().map(|k| (*k, *k * 10)).collect())
                    },
                    3,
                )
                .await
        })
    });
    let results: Vec<_> = batch_lookup_resolve(tasks, &manager).collect();
    assert_eq!(results.len(), 3);
    for (k, r) in keys.iter().zip(results.iter()) {
        assert_eq!(*r.as_ref().unwrap(), k * 10);
    }
    assert_eq!(calls.borrow().len(), 1, "all three keys must land in one batch");
    assert_eq!(calls.borrow()[0].len(), 3);
}

#[tokio::test]
async fn double_lookup_batches_each_round_separately() {
    // Two tasks, each doing a first lookup and then (once it resolves) a
    // second lookup keyed off the first result. Every first-round lookup
    // across both tasks must land in one batch before any second-round
    // lookup is even issued.
    let manager = LookupManager::new();
    let calls = bulk_calls_log();

    let bulk_fn = {
        let calls = Rc::clone(&calls);
        move |batch: &[i32]| {
            calls.borrow_mut().push(batch.to_vec());
            Ok(batch.iter().map(|k| (*k, *k)).collect())
        }
    };

    let keys = vec![1, 2];
    let tasks = keys.into_iter().map(|k| {
        let bulk_fn = bulk_fn.clone();
        let manager = &manager;
        task(async move {
            let first = manager.lookup_required(k, "double", bulk_fn.clone(), 0).await?;
            let second = manager.lookup_required(first + 10, "double", bulk_fn, 0).await?;
            Ok(second)
        })
    });

    let results: Vec<_> = batch_lookup_resolve(tasks, &manager).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(*results[0].as_ref().unwrap(), 11);
    assert_eq!(*results[1].as_ref().unwrap(), 12);
    assert_eq!(calls.borrow().len(), 2, "each round must flush as its own batch");
    assert_eq!(calls.borrow()[0].len(), 2, "both first-round lookups must share one batch");
    assert_eq!(calls.borrow()[1].len(), 2, "both second-round lookups must share one batch");
}

#[tokio::test]
async fn multi_lookup_with_overlapping_keysets_preserves_order() {
    let manager = LookupManager::new();
    let tasks = vec![task(async {
        manager
            .lookup_multi(
                vec![1, 2, 1, 3],
                "multi",
                |batch: &[i32]| Ok(batch.iter().map(|k| (*k, k.to_string())).collect()),
                0,
            )
            .await
    })];
    let results: Vec<_> = batch_lookup_resolve(tasks.into_iter(), &manager).collect();
    assert_eq!(
        results[0].as_ref().unwrap(),
        &vec!["1".to_string(), "2".to_string(), "1".to_string(), "3".to_string()]
    );
}

#[derive(Clone, Debug, PartialEq)]
struct Comment {
    post_id: i32,
    body: String,
}

#[tokio::test]
async fn collection_lookup_groups_flat_results_by_key() {
    let manager = LookupManager::new();
    let tasks = vec![task(async {
        manager
            .lookup_collection(
                vec![1, 2],
                "comments",
                |ids: &[i32]| {
                    Ok(ids
                        .iter()
                        .flat_map(|id| {
                            vec![
                                Comment { post_id: *id, body: format!("c1-{id}") },
                                Comment { post_id: *id, body: format!("c2-{id}") },
                            ]
                        })
                        .collect())
                },
                |c: &Comment| c.post_id,
                0,
            )
            .await
    })];
    let results: Vec<_> = batch_lookup_resolve(tasks.into_iter(), &manager).collect();
    let comments = results[0].as_ref().unwrap();
    assert_eq!(comments.len(), 4);
    assert!(comments.iter().any(|c| c.body == "c1-1"));
    assert!(comments.iter().any(|c| c.body == "c2-2"));
}

#[tokio::test]
async fn bulk_function_failure_aborts_the_driver() {
    // Both tasks queue against the same failing batch, so both promises
    // fail at once, but the Driver must still surface only the first one
    // and stop: no output past the failure point.
    let manager = LookupManager::new();
    let keys = vec![1, 2];
    let tasks = keys.into_iter().map(|k| {
        task(async move {
            manager
                .lookup_required(
                    k,
                    "erroring",
                    |_: &[i32]| Err::<HashMap<i32, i32>, _>("backend down".to_string()),
                    2,
                )
                .await
        })
    });
    let results: Vec<_> = batch_lookup_resolve(tasks, &manager).collect();
    assert_eq!(results.len(), 1, "the driver must abort after the first failure");
    assert!(matches!(results[0], Err(LookupError::BulkFunctionFailure { .. })));
}

#[tokio::test]
async fn key_not_found_raises_by_default() {
    let manager = LookupManager::new();
    let tasks = vec![task(async {
        manager
            .lookup_required(99, "missing", |_: &[i32]| Ok(HashMap::<i32, i32>::new()), 0)
            .await
    })];
    let results: Vec<_> = batch_lookup_resolve(tasks.into_iter(), &manager).collect();
    assert!(matches!(results[0], Err(LookupError::KeyNotFound { .. })));
}

#[tokio::test]
async fn key_not_found_factory_can_be_overridden() {
    let manager = LookupManager::new().with_not_found_factory(|key, _type_tag| {
        LookupError::CallerTaskFailure(format!("no such thing: {key}"))
    });
    let tasks = vec![task(async {
        manager
            .lookup_required(7, "missing-custom", |_: &[i32]| Ok(HashMap::<i32, i32>::new()), 0)
            .await
    })];
    let results: Vec<_> = batch_lookup_resolve(tasks.into_iter(), &manager).collect();
    assert!(matches!(results[0], Err(LookupError::CallerTaskFailure(_))));
}

#[tokio::test]
async fn immediate_scope_bypasses_batching_entirely() {
    let manager = LookupManager::new();
    let calls = bulk_calls_log();
    let calls_for_fn = Rc::clone(&calls);

    let scope = manager.begin_immediate_scope();
    let value = manager
        .lookup_required(
            5,
            "immediate",
            move |batch: &[i32]| {
                calls_for_fn.borrow_mut().push(batch.to_vec());
                Ok(batch.iter().map(|k| (*k, *k * 2)).collect())
            },
            10,
        )
        .await
        .unwrap();
    scope.end().unwrap();

    assert_eq!(value, 10);
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(calls.borrow()[0], vec![5]);
}
