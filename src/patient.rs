//! Hosts of a virus population.

use crate::config::check_num;
use crate::model::{Reproduction, ResistantVirus, Virus};
use anyhow::{Context, Result};
use rand::prelude::*;

/// Untreated host.
///
/// Holds the virus population and the maximum population used to compute
/// the population density.
#[derive(Debug, Clone)]
pub struct Patient<V> {
    viruses: Vec<V>,
    max_pop: usize,
}

impl<V: Virus> Patient<V> {
    pub fn new(viruses: Vec<V>, max_pop: usize) -> Result<Self> {
        check_num(max_pop, 1..).context("invalid maximum population")?;
        Ok(Self { viruses, max_pop })
    }

    pub fn viruses(&self) -> &[V] {
        &self.viruses
    }

    pub fn max_pop(&self) -> usize {
        self.max_pop
    }

    pub fn total_pop(&self) -> usize {
        self.viruses.len()
    }

    /// Advance the population by one step and return its new size.
    pub fn update<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<usize> {
        self.perform_step(&[], rng)
    }

    fn perform_step<R: Rng + ?Sized>(
        &mut self,
        active_drugs: &[String],
        rng: &mut R,
    ) -> Result<usize> {
        // Remove cleared viruses.
        self.viruses.retain(|virus| !virus.does_clear(rng));

        // Density is fixed for the rest of the step.
        let pop_density = self.viruses.len() as f64 / self.max_pop as f64;

        // Only survivors reproduce; offspring join after the pass.
        let mut offspring = Vec::new();
        for virus in &self.viruses {
            if let Reproduction::Offspring(child) = virus
                .reproduce(pop_density, active_drugs, rng)
                .context("failed to reproduce virus")?
            {
                offspring.push(child);
            }
        }
        self.viruses.append(&mut offspring);

        Ok(self.viruses.len())
    }
}

/// Host that can be prescribed drugs.
#[derive(Debug, Clone)]
pub struct TreatedPatient {
    patient: Patient<ResistantVirus>,
    drugs: Vec<String>,
}

impl TreatedPatient {
    pub fn new(viruses: Vec<ResistantVirus>, max_pop: usize) -> Result<Self> {
        let patient = Patient::new(viruses, max_pop)?;
        Ok(Self {
            patient,
            drugs: Vec::new(),
        })
    }

    pub fn viruses(&self) -> &[ResistantVirus] {
        self.patient.viruses()
    }

    pub fn max_pop(&self) -> usize {
        self.patient.max_pop()
    }

    pub fn total_pop(&self) -> usize {
        self.patient.total_pop()
    }

    /// Administer a drug for all subsequent steps. Has no effect if the drug
    /// is already prescribed.
    pub fn add_prescription(&mut self, drug: &str) {
        if !self.drugs.iter().any(|d| d == drug) {
            self.drugs.push(drug.to_string());
        }
    }

    /// Drugs in the order they were prescribed.
    pub fn prescriptions(&self) -> &[String] {
        &self.drugs
    }

    /// Number of viruses resistant to every drug in `drugs`.
    pub fn resist_pop(&self, drugs: &[String]) -> usize {
        self.patient
            .viruses()
            .iter()
            .filter(|virus| drugs.iter().all(|drug| virus.is_resistant_to(drug)))
            .count()
    }

    /// Advance the population by one step under the current prescriptions and
    /// return its new size.
    pub fn update<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<usize> {
        self.patient.perform_step(&self.drugs, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimpleVirus;
    use rand_chacha::ChaCha12Rng;
    use std::collections::BTreeMap;

    fn simple_patient(n_viruses: usize, max_birth_prob: f64, clear_prob: f64) -> Patient<SimpleVirus> {
        let virus = SimpleVirus::new(max_birth_prob, clear_prob).unwrap();
        Patient::new(vec![virus; n_viruses], 100).unwrap()
    }

    fn resistant_patient(
        n_viruses: usize,
        max_birth_prob: f64,
        resistances: &[(&str, bool)],
    ) -> TreatedPatient {
        let resistances: BTreeMap<String, bool> = resistances
            .iter()
            .map(|&(drug, resistant)| (drug.to_string(), resistant))
            .collect();
        let virus = ResistantVirus::new(max_birth_prob, 0.0, resistances, 0.0).unwrap();
        TreatedPatient::new(vec![virus; n_viruses], 1000).unwrap()
    }

    #[test]
    fn rejects_zero_max_pop() {
        let virus = SimpleVirus::new(0.1, 0.1).unwrap();
        assert!(Patient::new(vec![virus], 0).is_err());
        assert!(TreatedPatient::new(Vec::new(), 0).is_err());
    }

    #[test]
    fn static_population_is_invariant() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let mut patient = simple_patient(10, 0.0, 0.0);
        for _ in 0..100 {
            assert_eq!(patient.update(&mut rng).unwrap(), 10);
        }
        assert_eq!(patient.total_pop(), 10);
    }

    #[test]
    fn certain_clearance_empties_population() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let mut patient = simple_patient(50, 1.0, 1.0);
        assert_eq!(patient.update(&mut rng).unwrap(), 0);
        assert!(patient.viruses().is_empty());
    }

    #[test]
    fn offspring_do_not_reproduce_in_their_birth_step() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        // Density rounds to zero, so every survivor reproduces.
        let virus = SimpleVirus::new(1.0, 0.0).unwrap();
        let mut patient = Patient::new(vec![virus; 1], usize::MAX).unwrap();
        assert_eq!(patient.update(&mut rng).unwrap(), 2);
        assert_eq!(patient.update(&mut rng).unwrap(), 4);
        assert_eq!(patient.update(&mut rng).unwrap(), 8);
    }

    #[test]
    fn population_stalls_above_max_pop() {
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let virus = SimpleVirus::new(1.0, 0.0).unwrap();
        let mut patient = Patient::new(vec![virus; 20], 10).unwrap();
        for _ in 0..10 {
            assert_eq!(patient.update(&mut rng).unwrap(), 20);
        }
    }

    #[test]
    fn population_approaches_equilibrium() {
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let virus = SimpleVirus::new(0.1, 0.05).unwrap();
        let mut patient = Patient::new(vec![virus; 100], 1000).unwrap();
        let mut n_last = 0;
        for _ in 0..300 {
            n_last = patient.update(&mut rng).unwrap();
        }
        // Survivors s satisfy 0.1 * (1 - s / 1000) = 0.05 / 0.95 at equilibrium.
        assert!(n_last > 380 && n_last < 620, "population {n_last}");
    }

    #[test]
    fn prescriptions_are_idempotent_and_ordered() {
        let mut patient = resistant_patient(1, 0.0, &[]);
        assert!(patient.prescriptions().is_empty());
        patient.add_prescription("guttagonol");
        patient.add_prescription("srinol");
        patient.add_prescription("guttagonol");
        assert_eq!(patient.prescriptions(), &["guttagonol".to_string(), "srinol".to_string()]);
    }

    #[test]
    fn resist_pop_counts_full_resistance() {
        let mut patient = resistant_patient(5, 0.0, &[("X", true), ("Y", false)]);
        let virus = ResistantVirus::new(
            0.0,
            0.0,
            [("X".to_string(), true), ("Y".to_string(), true)].into(),
            0.0,
        )
        .unwrap();
        patient.patient.viruses.push(virus);

        assert_eq!(patient.resist_pop(&[]), 6);
        assert_eq!(patient.resist_pop(&["X".to_string()]), 6);
        assert_eq!(patient.resist_pop(&["X".to_string(), "Y".to_string()]), 1);
        assert_eq!(patient.resist_pop(&["Z".to_string()]), 0);
    }

    #[test]
    fn unresisted_prescription_stops_growth() {
        let mut rng = ChaCha12Rng::seed_from_u64(6);
        let mut patient = resistant_patient(10, 1.0, &[("X", false)]);
        patient.add_prescription("X");
        for _ in 0..50 {
            assert_eq!(patient.update(&mut rng).unwrap(), 10);
        }
        assert_eq!(patient.resist_pop(&["X".to_string()]), 0);
    }

    #[test]
    fn resisted_prescription_allows_growth() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut patient = resistant_patient(10, 1.0, &[("X", true)]);
        patient.add_prescription("X");
        let n_viruses = patient.update(&mut rng).unwrap();
        assert!(n_viruses > 10);
        assert_eq!(patient.resist_pop(&["X".to_string()]), n_viruses);
    }
}
