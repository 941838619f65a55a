//! Property-based checks of the quantified invariants from the engine's
//! design: cluster-count accounting, disjointness, and the free-cluster
//! bookkeeping identity, driven across randomized operation sequences.

use acfs::{Config, Engine, RamMedium};
use proptest::prelude::*;

const CLUSTER_SIZE: u16 = 128;
const RESERVED_CLUSTERS: u16 = 4;
const MEDIUM_CLUSTERS: u32 = 40;

fn fresh_engine() -> Engine<RamMedium> {
    let medium = RamMedium::new(MEDIUM_CLUSTERS * CLUSTER_SIZE as u32);
    let mut fs = Engine::new(
        medium,
        Config {
            cluster_size: CLUSTER_SIZE,
            reserved_clusters: RESERVED_CLUSTERS,
            format_if_invalid: true,
            enable_crc_check: true,
        },
    );
    fs.mount().unwrap();
    fs
}

#[derive(Debug, Clone)]
enum Op {
    Write { id: u8, len: u16 },
    Delete { id: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, 1u16..400).prop_map(|(id, len)| Op::Write { id, len }),
        (0u8..6).prop_map(|id| Op::Delete { id }),
    ]
}

proptest! {
    #[test]
    fn invariants_hold_after_random_ops(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut fs = fresh_engine();
        let mut model: std::collections::HashMap<u8, Vec<u8>> = std::collections::HashMap::new();

        for op in ops {
            match op {
                Op::Write { id, len } => {
                    let data: Vec<u8> = (0..len).map(|i| (i ^ id as u16) as u8).collect();
                    match fs.write(&id.to_string(), &data) {
                        Ok(()) => {
                            model.insert(id, data);
                        }
                        Err(acfs::Error::NoSpace) | Err(acfs::Error::ClusterFull) => {}
                        Err(e) => prop_assert!(false, "unexpected write error: {e}"),
                    }
                }
                Op::Delete { id } => {
                    let sid = id.to_string();
                    let existed = fs.exists(&sid).unwrap();
                    match fs.delete(&sid) {
                        Ok(()) => {
                            prop_assert!(existed);
                            model.remove(&id);
                        }
                        Err(acfs::Error::DataNotFound) => prop_assert!(!existed),
                        Err(e) => prop_assert!(false, "unexpected delete error: {e}"),
                    }
                }
            }

            // invariant 1 & 5: every live entry's size agrees with the model,
            // and reading it back reproduces the bytes exactly.
            for (id, expected) in &model {
                let sid = id.to_string();
                prop_assert!(fs.exists(&sid).unwrap());
                prop_assert_eq!(fs.get_size(&sid).unwrap() as usize, expected.len());
                let mut buf = vec![0u8; expected.len()];
                fs.read(&sid, &mut buf).unwrap();
                prop_assert_eq!(&buf, expected);
            }

            // invariant 3: free + in-use + reserved == total.
            let stats = fs.get_stats().unwrap();
            let used_by_model: u32 = model
                .values()
                .map(|v| (v.len() as u32).div_ceil(CLUSTER_SIZE as u32))
                .sum();
            prop_assert_eq!(
                stats.free_clusters as u32 + used_by_model + stats.sys_clusters as u32,
                stats.total_clusters as u32
            );
            prop_assert_eq!(stats.data_entries as usize, model.len());
        }
    }
}

#[test]
fn format_then_mount_starts_empty() {
    let fs = fresh_engine();
    let stats = fs.get_stats().unwrap();
    assert_eq!(stats.data_entries, 0);
    assert_eq!(stats.free_clusters as u32, MEDIUM_CLUSTERS - RESERVED_CLUSTERS as u32);
}

#[test]
fn write_then_delete_restores_free_space() {
    let mut fs = fresh_engine();
    let before = fs.get_free_space().unwrap();
    fs.write("solo", &vec![9u8; 250]).unwrap();
    assert!(fs.get_free_space().unwrap() < before);
    fs.delete("solo").unwrap();
    assert_eq!(fs.get_free_space().unwrap(), before);
    assert!(!fs.exists("solo").unwrap());
}

#[test]
fn idempotent_rewrite_keeps_single_entry() {
    let mut fs = fresh_engine();
    fs.write("id", b"same bytes").unwrap();
    let free_after_first = fs.get_free_space().unwrap();
    fs.write("id", b"same bytes").unwrap();
    assert_eq!(fs.get_free_space().unwrap(), free_after_first);
    assert_eq!(fs.get_stats().unwrap().data_entries, 1);
}
