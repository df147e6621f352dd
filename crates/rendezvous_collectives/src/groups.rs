//! # Participant Groups
//!
//! Works out which replicas and devices take part in a collective.
//!
//! A [`DeviceAssignment`] maps every (replica, computation) pair to a global
//! device. Replica groups partition the replicas; a collective only spans the
//! replicas of one group, all in the same computation.

use rendezvous_core::GlobalDeviceId;

use crate::error::{CollectiveError, CollectiveResult};

/// A set of replicas that run a collective together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaGroup {
    /// Replica ids in the group, in collective order.
    pub replica_ids: Vec<usize>,
}

impl ReplicaGroup {
    /// Creates a group.
    pub fn new(replica_ids: impl IntoIterator<Item = usize>) -> Self {
        Self {
            replica_ids: replica_ids.into_iter().collect(),
        }
    }

    /// Returns true if `replica_id` is in the group.
    #[must_use]
    pub fn contains(&self, replica_id: usize) -> bool {
        self.replica_ids.contains(&replica_id)
    }
}

/// Replicas taking part in the collective that `replica_id` joins.
///
/// Empty `groups` means all `total_replica_count` replicas take part.
///
/// # Errors
///
/// - [`CollectiveError::ReplicaOutOfRange`] if `replica_id` or a member of its
///   group is not below `total_replica_count`.
/// - [`CollectiveError::ReplicaNotInGroup`] if no group contains `replica_id`.
/// - [`CollectiveError::ReplicaInMultipleGroups`] if several do.
pub fn participating_replicas(
    replica_id: usize,
    total_replica_count: usize,
    groups: &[ReplicaGroup],
) -> CollectiveResult<Vec<usize>> {
    let out_of_range = |replica| CollectiveError::ReplicaOutOfRange {
        replica,
        total: total_replica_count,
    };
    if replica_id >= total_replica_count {
        return Err(out_of_range(replica_id));
    }
    if groups.is_empty() {
        return Ok((0..total_replica_count).collect());
    }

    let mut containing = groups.iter().filter(|g| g.contains(replica_id));
    let group = match (containing.next(), containing.next()) {
        (Some(group), None) => group,
        (None, _) => return Err(CollectiveError::ReplicaNotInGroup(replica_id)),
        (Some(_), Some(_)) => return Err(CollectiveError::ReplicaInMultipleGroups(replica_id)),
    };
    if let Some(&bad) = group.replica_ids.iter().find(|&&r| r >= total_replica_count) {
        return Err(out_of_range(bad));
    }
    Ok(group.replica_ids.clone())
}

/// Position of a device in a [`DeviceAssignment`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LogicalIds {
    /// Row.
    pub replica_id: usize,
    /// Column.
    pub computation_id: usize,
}

/// Replica × computation matrix of global devices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAssignment {
    replica_count: usize,
    computation_count: usize,
    /// Row-major: `devices[replica * computation_count + computation]`.
    devices: Vec<GlobalDeviceId>,
}

impl DeviceAssignment {
    /// Builds an assignment by calling `device(replica, computation)` for
    /// every cell.
    pub fn from_fn<F>(replica_count: usize, computation_count: usize, mut device: F) -> Self
    where
        F: FnMut(usize, usize) -> GlobalDeviceId,
    {
        let mut devices = Vec::with_capacity(replica_count * computation_count);
        for replica in 0..replica_count {
            for computation in 0..computation_count {
                devices.push(device(replica, computation));
            }
        }
        Self {
            replica_count,
            computation_count,
            devices,
        }
    }

    /// Number of replicas (rows).
    #[inline]
    #[must_use]
    pub const fn replica_count(&self) -> usize {
        self.replica_count
    }

    /// Number of computations (columns).
    #[inline]
    #[must_use]
    pub const fn computation_count(&self) -> usize {
        self.computation_count
    }

    /// Device at (`replica`, `computation`), if both are in range.
    #[must_use]
    pub fn get(&self, replica: usize, computation: usize) -> Option<GlobalDeviceId> {
        if replica >= self.replica_count || computation >= self.computation_count {
            return None;
        }
        self.devices
            .get(replica * self.computation_count + computation)
            .copied()
    }

    /// Reassigns the device at (`replica`, `computation`).
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn set(&mut self, replica: usize, computation: usize, device: GlobalDeviceId) {
        assert!(
            replica < self.replica_count && computation < self.computation_count,
            "device assignment index ({replica}, {computation}) out of range for {}x{}",
            self.replica_count,
            self.computation_count
        );
        self.devices[replica * self.computation_count + computation] = device;
    }

    /// Finds where `device` sits in the assignment.
    ///
    /// # Errors
    ///
    /// [`CollectiveError::DeviceNotAssigned`] if the device is not in the matrix.
    pub fn logical_ids_for_device(&self, device: GlobalDeviceId) -> CollectiveResult<LogicalIds> {
        let position = self
            .devices
            .iter()
            .position(|&d| d == device)
            .ok_or(CollectiveError::DeviceNotAssigned(device))?;
        Ok(LogicalIds {
            replica_id: position / self.computation_count,
            computation_id: position % self.computation_count,
        })
    }
}

/// Devices taking part in the collective that `device_id` joins.
///
/// Every participating replica is mapped to its device in the same
/// computation as `device_id`.
///
/// # Errors
///
/// - [`CollectiveError::DeviceNotAssigned`] if `device_id` is not assigned.
/// - Anything [`participating_replicas`] returns.
/// - [`CollectiveError::ReplicaOutOfRange`] if a participating replica has no
///   row in the assignment.
pub fn participating_devices(
    device_id: GlobalDeviceId,
    assignment: &DeviceAssignment,
    total_replica_count: usize,
    groups: &[ReplicaGroup],
) -> CollectiveResult<Vec<GlobalDeviceId>> {
    let ids = assignment.logical_ids_for_device(device_id)?;
    let replicas = participating_replicas(ids.replica_id, total_replica_count, groups)?;
    replicas
        .into_iter()
        .map(|replica| {
            assignment
                .get(replica, ids.computation_id)
                .ok_or(CollectiveError::ReplicaOutOfRange {
                    replica,
                    total: assignment.replica_count(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4 replicas × 2 computations, device id = 10 * computation + replica.
    fn assignment() -> DeviceAssignment {
        DeviceAssignment::from_fn(4, 2, |r, c| GlobalDeviceId(u32::try_from(10 * c + r).unwrap()))
    }

    fn ids(devices: &[u32]) -> Vec<GlobalDeviceId> {
        devices.iter().copied().map(GlobalDeviceId).collect()
    }

    #[test]
    fn test_no_groups_means_everyone() {
        assert_eq!(participating_replicas(2, 4, &[]).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_replica_finds_its_group() {
        let groups = [ReplicaGroup::new([0, 2]), ReplicaGroup::new([3, 1])];
        assert_eq!(participating_replicas(1, 4, &groups).unwrap(), vec![3, 1]);
        assert_eq!(participating_replicas(2, 4, &groups).unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_replica_group_errors() {
        let groups = [ReplicaGroup::new([0, 1]), ReplicaGroup::new([1, 2])];
        assert_eq!(
            participating_replicas(3, 4, &groups),
            Err(CollectiveError::ReplicaNotInGroup(3))
        );
        assert_eq!(
            participating_replicas(1, 4, &groups),
            Err(CollectiveError::ReplicaInMultipleGroups(1))
        );
        assert_eq!(
            participating_replicas(4, 4, &[]),
            Err(CollectiveError::ReplicaOutOfRange { replica: 4, total: 4 })
        );
        assert_eq!(
            participating_replicas(0, 2, &[ReplicaGroup::new([0, 5])]),
            Err(CollectiveError::ReplicaOutOfRange { replica: 5, total: 2 })
        );
    }

    #[test]
    fn test_device_assignment_lookup() {
        let mut da = assignment();
        assert_eq!(da.replica_count(), 4);
        assert_eq!(da.computation_count(), 2);
        assert_eq!(da.get(3, 1), Some(GlobalDeviceId(13)));
        assert_eq!(da.get(4, 0), None);
        assert_eq!(da.get(0, 2), None);
        assert_eq!(
            da.logical_ids_for_device(GlobalDeviceId(12)).unwrap(),
            LogicalIds {
                replica_id: 2,
                computation_id: 1
            }
        );

        da.set(2, 1, GlobalDeviceId(99));
        assert_eq!(
            da.logical_ids_for_device(GlobalDeviceId(12)),
            Err(CollectiveError::DeviceNotAssigned(GlobalDeviceId(12)))
        );
        assert_eq!(da.logical_ids_for_device(GlobalDeviceId(99)).unwrap().replica_id, 2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_set_out_of_range_panics() {
        assignment().set(0, 2, GlobalDeviceId(0));
    }

    #[test]
    fn test_participating_devices_stay_in_the_column() {
        let da = assignment();
        assert_eq!(
            participating_devices(GlobalDeviceId(11), &da, 4, &[]).unwrap(),
            ids(&[10, 11, 12, 13])
        );

        let groups = [ReplicaGroup::new([0, 1]), ReplicaGroup::new([2, 3])];
        assert_eq!(
            participating_devices(GlobalDeviceId(3), &da, 4, &groups).unwrap(),
            ids(&[2, 3])
        );
        assert_eq!(
            participating_devices(GlobalDeviceId(42), &da, 4, &groups),
            Err(CollectiveError::DeviceNotAssigned(GlobalDeviceId(42)))
        );
    }

    #[test]
    fn test_replicas_beyond_the_assignment() {
        let da = DeviceAssignment::from_fn(2, 1, |r, _| GlobalDeviceId(u32::try_from(r).unwrap()));
        assert_eq!(
            participating_devices(GlobalDeviceId(0), &da, 3, &[]),
            Err(CollectiveError::ReplicaOutOfRange { replica: 2, total: 2 })
        );
    }
}
