//! Initial agent placement.
//!
//! Every agent draws from its own generator, seeded from the run seed and the
//! agent's index, so the population is identical for a given seed no matter
//! how the work is split across threads.

use std::f32::consts::{PI, TAU};

use cgmath::Vector2;
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::{Settings, SpawnMethod};
use crate::layout::Agent;

/// Generates exactly `count` agents for a `width` x `height` field.
pub fn generate(count: u32, width: u32, height: u32, method: SpawnMethod, seed: u64) -> Vec<Agent> {
    let field = Field::new(width, height);
    (0..count)
        .into_par_iter()
        .map(|index| {
            let mut rng = SmallRng::seed_from_u64(agent_seed(seed, index));
            field.spawn(method, &mut rng)
        })
        .collect()
}

/// Generates the population described by `settings`, returning the seed that
/// was used so a run can be reproduced.
pub fn generate_for(settings: &Settings) -> (u64, Vec<Agent>) {
    let seed = settings.seed.unwrap_or_else(rand::random);
    info!(
        "spawning {} agents ({:?}) with seed {}",
        settings.agent_number, settings.spawn_method, seed
    );
    let agents = generate(
        settings.agent_number,
        settings.map_width,
        settings.map_height,
        settings.spawn_method,
        seed,
    );
    debug!("spawned {} agents", agents.len());
    (seed, agents)
}

/// splitmix64 over (seed, index).
fn agent_seed(seed: u64, index: u32) -> u64 {
    let mut z = seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

struct Field {
    width: u32,
    height: u32,
    centre: Vector2<f32>,
    circle_radius: u32,
}

impl Field {
    fn new(width: u32, height: u32) -> Self {
        Field {
            width,
            height,
            centre: Vector2::new((width / 2) as f32, (height / 2) as f32),
            // Narrow fields shrink the circle so it stays on the field.
            circle_radius: width.min(height) / 3,
        }
    }

    fn spawn(&self, method: SpawnMethod, rng: &mut SmallRng) -> Agent {
        match method {
            SpawnMethod::Centre => {
                // Headings cover the circle twice; kept for parity with existing presets.
                let angle = rng.gen_range(0.0..2.0 * TAU);
                Agent::new(self.centre.x, self.centre.y, angle)
            }
            SpawnMethod::Circle => {
                // Radius is uniform, not area-uniform: density peaks at the centre.
                let distance = rng.gen_range(0..=self.circle_radius) as f32;
                let placement = rng.gen_range(0.0..TAU);
                let position = self.centre + Vector2::new(placement.cos(), placement.sin()) * distance;
                Agent::new(position.x, position.y, placement + PI)
            }
            SpawnMethod::Random => {
                let x = rng.gen_range(0..=self.width) as f32;
                let y = rng.gen_range(0..=self.height) as f32;
                let angle = rng.gen_range(0.0..TAU);
                Agent::new(x, y, angle)
            }
        }
    }
}
