//! Virus entities.

use crate::config::check_num;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::Bernoulli;
use std::collections::BTreeMap;

/// Outcome of a single reproduction attempt.
#[derive(Debug, PartialEq)]
pub enum Reproduction<V> {
    Offspring(V),
    NoOffspring,
}

/// Behavior shared by every virus variant hosted by a [`Patient`](crate::patient::Patient).
pub trait Virus: Sized {
    /// Decide whether this virus is cleared from the host at this step.
    fn does_clear<R: Rng + ?Sized>(&self, rng: &mut R) -> bool;

    /// Attempt to reproduce at the given population density.
    ///
    /// `active_drugs` lists the drugs currently acting on the host.
    fn reproduce<R: Rng + ?Sized>(
        &self,
        pop_density: f64,
        active_drugs: &[String],
        rng: &mut R,
    ) -> Result<Reproduction<Self>>;
}

/// Birth and clearance probabilities of a virus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinetics {
    max_birth_prob: f64,
    clear_prob: f64,
    clear_dist: Bernoulli,
}

impl Kinetics {
    pub fn new(max_birth_prob: f64, clear_prob: f64) -> Result<Self> {
        check_num(max_birth_prob, 0.0..=1.0).context("invalid maximum birth probability")?;
        check_num(clear_prob, 0.0..=1.0).context("invalid clearance probability")?;
        let clear_dist = Bernoulli::new(clear_prob)?;
        Ok(Self {
            max_birth_prob,
            clear_prob,
            clear_dist,
        })
    }

    pub fn max_birth_prob(&self) -> f64 {
        self.max_birth_prob
    }

    pub fn clear_prob(&self) -> f64 {
        self.clear_prob
    }

    fn does_clear<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.clear_dist.sample(rng)
    }

    /// Draw a birth with probability `max_birth_prob * (1 - pop_density)`.
    ///
    /// Above the maximum population the probability is zero.
    fn is_born<R: Rng + ?Sized>(&self, pop_density: f64, rng: &mut R) -> Result<bool> {
        let prob = (self.max_birth_prob * (1.0 - pop_density)).max(0.0);
        let birth_dist = Bernoulli::new(prob)
            .with_context(|| format!("invalid birth probability at density {pop_density}"))?;
        Ok(birth_dist.sample(rng))
    }
}

/// Virus without any drug resistance. Drugs do not affect it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleVirus {
    kinetics: Kinetics,
}

impl SimpleVirus {
    pub fn new(max_birth_prob: f64, clear_prob: f64) -> Result<Self> {
        let kinetics = Kinetics::new(max_birth_prob, clear_prob)?;
        Ok(Self { kinetics })
    }

    pub fn kinetics(&self) -> &Kinetics {
        &self.kinetics
    }
}

impl Virus for SimpleVirus {
    fn does_clear<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.kinetics.does_clear(rng)
    }

    fn reproduce<R: Rng + ?Sized>(
        &self,
        pop_density: f64,
        _active_drugs: &[String],
        rng: &mut R,
    ) -> Result<Reproduction<Self>> {
        if self.kinetics.is_born(pop_density, rng)? {
            Ok(Reproduction::Offspring(self.clone()))
        } else {
            Ok(Reproduction::NoOffspring)
        }
    }
}

/// Virus carrying a resistance profile that can mutate in its offspring.
#[derive(Debug, Clone, PartialEq)]
pub struct ResistantVirus {
    kinetics: Kinetics,
    resistances: BTreeMap<String, bool>,
    mut_prob: f64,
    mut_dist: Bernoulli,
}

impl ResistantVirus {
    pub fn new(
        max_birth_prob: f64,
        clear_prob: f64,
        resistances: BTreeMap<String, bool>,
        mut_prob: f64,
    ) -> Result<Self> {
        let kinetics = Kinetics::new(max_birth_prob, clear_prob)?;
        check_num(mut_prob, 0.0..=1.0).context("invalid mutation probability")?;
        let mut_dist = Bernoulli::new(mut_prob)?;
        Ok(Self {
            kinetics,
            resistances,
            mut_prob,
            mut_dist,
        })
    }

    pub fn kinetics(&self) -> &Kinetics {
        &self.kinetics
    }

    pub fn resistances(&self) -> &BTreeMap<String, bool> {
        &self.resistances
    }

    pub fn mut_prob(&self) -> f64 {
        self.mut_prob
    }

    /// Drugs missing from the resistance profile are not resisted.
    pub fn is_resistant_to(&self, drug: &str) -> bool {
        self.resistances.get(drug).copied().unwrap_or(false)
    }
}

impl Virus for ResistantVirus {
    fn does_clear<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.kinetics.does_clear(rng)
    }

    fn reproduce<R: Rng + ?Sized>(
        &self,
        pop_density: f64,
        active_drugs: &[String],
        rng: &mut R,
    ) -> Result<Reproduction<Self>> {
        // Any active drug the virus does not resist blocks reproduction.
        if !active_drugs.iter().all(|drug| self.is_resistant_to(drug)) {
            return Ok(Reproduction::NoOffspring);
        }

        if !self.kinetics.is_born(pop_density, rng)? {
            return Ok(Reproduction::NoOffspring);
        }

        // Each trait flips independently; the parent's profile is left untouched.
        let resistances = self
            .resistances
            .iter()
            .map(|(drug, &resistant)| (drug.clone(), resistant ^ self.mut_dist.sample(rng)))
            .collect();

        Ok(Reproduction::Offspring(Self {
            kinetics: self.kinetics,
            resistances,
            mut_prob: self.mut_prob,
            mut_dist: self.mut_dist,
        }))
    }
}
