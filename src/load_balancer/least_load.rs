//! Least load selection strategy.

use std::cmp::Ordering;
use std::sync::Arc;
use crate::load_balancer::{LoadBalancer, machine::Machine};

/// Selects the machine with the lowest `connections / max_connections`.
/// Ties go to the lowest last response time, then to registration order.
#[derive(Debug, Default)]
pub struct LeastLoad;

impl LeastLoad {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Compare `a.connections / a.max` with `b.connections / b.max` exactly.
fn compare_load(a: &Machine, b: &Machine) -> Ordering {
    let lhs = a.connections() as u128 * b.max_connections() as u128;
    let rhs = b.connections() as u128 * a.max_connections() as u128;
    lhs.cmp(&rhs)
}

impl LoadBalancer for LeastLoad {
    fn next_server(&self, machines: &[Arc<Machine>]) -> Option<Arc<Machine>> {
        // min_by keeps the first of equal elements, so registration order wins
        // the final tie.
        machines
            .iter()
            .filter(|m| m.has_capacity())
            .min_by(|a, b| {
                compare_load(a, b).then_with(|| a.last_response_time().cmp(&b.last_response_time()))
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::load_balancer::machine::{MachineConnectionGuard, MachineId};

    fn machine(port: u16, max: usize) -> Arc<Machine> {
        Arc::new(Machine::new(MachineId::new("127.0.0.1", port), max, port as u64).unwrap())
    }

    fn load(m: &Arc<Machine>, n: usize) -> Vec<MachineConnectionGuard> {
        (0..n).map(|_| m.acquire()).collect()
    }

    #[test]
    fn picks_lowest_load() {
        let a = machine(8080, 10);
        let b = machine(8081, 10);
        let _ga = load(&a, 2);
        let _gb = load(&b, 1);

        let picked = LeastLoad::new().next_server(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(picked.id(), b.id());
    }

    #[test]
    fn load_is_relative_to_capacity() {
        let small = machine(8080, 10);
        let large = machine(8081, 1000);
        let _gs = load(&small, 1);
        let _gl = load(&large, 50);

        // 1/10 = 0.1 > 50/1000 = 0.05
        let picked = LeastLoad::new().next_server(&[small, large.clone()]).unwrap();
        assert_eq!(picked.id(), large.id());
    }

    #[test]
    fn equal_load_prefers_faster_machine() {
        let a = machine(8080, 10);
        let b = machine(8081, 20);
        let _ga = load(&a, 1);
        let _gb = load(&b, 2);
        a.set_last_response_time(Duration::from_millis(40));
        b.set_last_response_time(Duration::from_millis(15));

        let picked = LeastLoad::new().next_server(&[a, b.clone()]).unwrap();
        assert_eq!(picked.id(), b.id());
    }

    #[test]
    fn full_tie_keeps_first() {
        let a = machine(8080, 10);
        let b = machine(8081, 10);
        let picked = LeastLoad::new().next_server(&[a.clone(), b]).unwrap();
        assert_eq!(picked.id(), a.id());
    }

    #[test]
    fn skips_saturated_machines() {
        let a = machine(8080, 1);
        let _ga = load(&a, 1);
        assert!(LeastLoad::new().next_server(&[a]).is_none());
    }

    #[test]
    fn empty_input() {
        assert!(LeastLoad::new().next_server(&[]).is_none());
    }
}
