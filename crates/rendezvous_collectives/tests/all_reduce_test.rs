//! End-to-end all-reduce across threads.

use crossbeam_channel::unbounded;
use rendezvous_collectives::{
    all_reduce, participating_devices, AllReduce, AllReducePayload, DeviceAssignment,
    ReduceBuffer, ReduceElement, ReductionKind, ReplicaGroup,
};
use rendezvous_core::{
    CollectiveOpKind, GlobalDeviceId, ParticipantData, ParticipantOutput, RendezvousError,
    RendezvousKey, RendezvousRegistry, RendezvousResult, RunId, StreamHandle,
};
use std::sync::Arc;
use std::thread;

/// Runs one all-reduce with one thread per entry of `inputs`.
///
/// Returns the outcomes in device-ordinal order.
fn run_all_reduce<T: ReduceElement>(
    key: &RendezvousKey,
    inputs: Vec<(ReductionKind, Vec<Vec<T>>)>,
) -> Vec<RendezvousResult<ParticipantOutput<Vec<Vec<T>>>>> {
    let registry = Arc::new(RendezvousRegistry::new(|_| AllReduce::<T>::new()));
    let local_devices: Vec<(GlobalDeviceId, usize)> = key
        .global_devices()
        .iter()
        .copied()
        .zip(0..)
        .collect();
    let (tx, rx) = unbounded();

    let handles: Vec<_> = inputs
        .into_iter()
        .enumerate()
        .map(|(ordinal, (kind, sources))| {
            let registry = Arc::clone(&registry);
            let tx = tx.clone();
            let payload = AllReducePayload::new(
                sources.into_iter().map(ReduceBuffer::new).collect(),
                kind,
            )
            .with_local_devices(local_devices.clone());
            let participant = ParticipantData::new(
                key.clone(),
                ordinal,
                StreamHandle::from_raw(0xa000 + ordinal as u64),
                payload,
            );
            thread::spawn(move || {
                tx.send((ordinal, all_reduce(&registry, participant))).unwrap();
            })
        })
        .collect();
    drop(tx);

    for h in handles {
        h.join().unwrap();
    }
    assert!(registry.is_empty());

    let mut results: Vec<_> = rx.iter().collect();
    results.sort_by_key(|(ordinal, _)| *ordinal);
    results.into_iter().map(|(_, result)| result).collect()
}

fn key(devices: &[u32], op_id: i64) -> RendezvousKey {
    RendezvousKey::new(
        RunId::from_raw(7),
        devices.iter().copied().map(GlobalDeviceId).collect(),
        devices.len(),
        CollectiveOpKind::CrossReplica,
        op_id,
    )
}

#[test]
fn test_four_device_sum() {
    let key = key(&[0, 1, 2, 3], 1);
    let inputs = [1.0_f32, 2.0, 3.0, 4.5]
        .into_iter()
        .map(|x| (ReductionKind::Sum, vec![vec![x]]))
        .collect();

    let results = run_all_reduce(&key, inputs);

    assert_eq!(results.len(), 4);
    let mut primaries = 0;
    for result in results {
        let out = result.unwrap();
        assert_eq!(out.output, vec![vec![10.5]]);
        primaries += usize::from(out.is_primary);
    }
    assert_eq!(primaries, 1);
}

#[test]
fn test_multi_buffer_min_max_product() {
    let key = key(&[4, 5, 6], 2);
    let sources = |i: i64| vec![vec![i, -i, 10], vec![i * 100]];

    for (kind, expected) in [
        (ReductionKind::Min, vec![vec![1, -3, 10], vec![100]]),
        (ReductionKind::Max, vec![vec![3, -1, 10], vec![300]]),
        (ReductionKind::Product, vec![vec![6, -6, 1000], vec![6_000_000]]),
    ] {
        let inputs = (1..=3).map(|i| (kind, sources(i))).collect();
        for result in run_all_reduce(&key, inputs) {
            assert_eq!(result.unwrap().output, expected, "{kind}");
        }
    }
}

#[test]
fn test_disagreeing_participant_fails_everyone() {
    let key = key(&[0, 1, 2], 3);
    let inputs = vec![
        (ReductionKind::Sum, vec![vec![1_u32]]),
        (ReductionKind::Sum, vec![vec![2]]),
        (ReductionKind::Max, vec![vec![3]]),
    ];

    let results = run_all_reduce(&key, inputs);

    let first = results[0].clone().unwrap_err();
    assert!(matches!(
        &first,
        RendezvousError::OperationFailed { key: k, .. } if *k == key.to_string()
    ));
    // Submission order decides which participant is reported as the odd one out.
    let reason = first.to_string();
    assert!(reason.contains("reduces with"));
    assert!(reason.contains("max") && reason.contains("sum"));
    assert!(results.iter().all(|r| r.as_ref().unwrap_err() == &first));
}

#[test]
fn test_replica_groups_drive_the_key() {
    // 4 replicas × 1 computation; two groups run their own all-reduce.
    let assignment = DeviceAssignment::from_fn(4, 1, |r, _| GlobalDeviceId(100 + r as u32));
    let groups = [ReplicaGroup::new([0, 2]), ReplicaGroup::new([1, 3])];

    let devices = participating_devices(GlobalDeviceId(102), &assignment, 4, &groups).unwrap();
    assert_eq!(devices, vec![GlobalDeviceId(100), GlobalDeviceId(102)]);

    let raw: Vec<u32> = devices.iter().map(|d| d.0).collect();
    let results = run_all_reduce(
        &key(&raw, 4),
        vec![
            (ReductionKind::Sum, vec![vec![1.5_f64, 2.0]]),
            (ReductionKind::Sum, vec![vec![0.5, 1.0]]),
        ],
    );
    for result in results {
        assert_eq!(result.unwrap().output, vec![vec![2.0, 3.0]]);
    }
}
