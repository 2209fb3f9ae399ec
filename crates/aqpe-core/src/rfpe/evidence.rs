use crate::model::{CircuitParameters, Evidence};
use rand::Rng;

/// Synthesises measurement counts in place of a quantum processor.
#[derive(Debug, Default)]
pub struct EvidenceGenerator;

impl EvidenceGenerator {
    /// Runs `shots` independent shots against the true phase `target_phi`.
    ///
    /// Each shot draws a uniform variate and reports outcome 0 when it falls below the
    /// closed-form probability of zero for the given circuit.
    pub fn run_circuit<R: Rng + ?Sized>(
        target_phi: f64,
        circuit: &CircuitParameters,
        shots: u64,
        rng: &mut R,
    ) -> Evidence {
        let p0 = circuit.probability_of_zero(target_phi);
        let mut zeros = 0u64;
        for _ in 0..shots {
            if rng.gen_range(0.0..1.0) < p0 {
                zeros += 1;
            }
        }
        Evidence::new(zeros, shots - zeros)
    }
}
