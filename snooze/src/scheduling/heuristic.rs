use crate::scheduling::{PlacementModel, Solver, SolverError};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

/// Randomized local search. Each step picks an overloaded host and one of its workloads at
/// random, scores every other host as a destination in parallel, and takes the move that reduces
/// total overload the most. Steps that find no improving move are skipped.
pub struct LocalSearchSolver {
  rng: SmallRng,
  max_moves: usize,
}
impl LocalSearchSolver {
  pub fn new(seed: u64) -> LocalSearchSolver {
    LocalSearchSolver {
      rng: SmallRng::seed_from_u64(seed),
      max_moves: 1000,
    }
  }

  pub fn with_max_moves(mut self, max_moves: usize) -> LocalSearchSolver {
    self.max_moves = max_moves;
    self
  }
}

fn overload(model: &PlacementModel, h: usize, cpu: f64, mem: u32) -> f64 {
  let c = (cpu - model.cpu_capacity[h]).max(0.0) / model.cpu_capacity[h].max(f64::EPSILON);
  let m = mem.saturating_sub(model.mem_capacity[h]) as f64 / model.mem_capacity[h].max(1) as f64;
  c + m
}

impl Solver for LocalSearchSolver {
  fn name(&self) -> &'static str {
    "local-search"
  }

  fn solve(&mut self, model: &PlacementModel) -> Result<Vec<usize>, SolverError> {
    let mut placement = model.placement.clone();
    let (mut cpu, mut mem) = model.loads(&placement);
    let hosts = model.hosts.len();
    for _ in 0..self.max_moves {
      let overloaded = (0..hosts).filter(|&h| !model.fits(h, cpu[h], mem[h])).collect::<Vec<_>>();
      let src = match overloaded.choose(&mut self.rng) {
        Some(&h) => h,
        None => return Ok(placement),
      };
      let residents = (0..placement.len()).filter(|&w| placement[w] == src).collect::<Vec<_>>();
      let w = match residents.choose(&mut self.rng) {
        Some(&w) => w,
        None => break,
      };
      let wl = &model.workloads[w];
      let before_src = overload(model, src, cpu[src], mem[src]);
      let after_src = overload(model, src, cpu[src] - wl.cpu, mem[src] - wl.mem);
      let (cpu_ref, mem_ref) = (&cpu, &mem);
      let best = (0..hosts)
        .into_par_iter()
        .filter(|&d| d != src)
        .map(|d| {
          let before = before_src + overload(model, d, cpu_ref[d], mem_ref[d]);
          let after = after_src + overload(model, d, cpu_ref[d] + wl.cpu, mem_ref[d] + wl.mem);
          (d, after - before)
        })
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
      if let Some((dst, delta)) = best {
        if delta < 0.0 {
          placement[w] = dst;
          cpu[src] -= wl.cpu;
          mem[src] -= wl.mem;
          cpu[dst] += wl.cpu;
          mem[dst] += wl.mem;
        }
      }
    }
    if model.is_viable(&placement) {
      Ok(placement)
    } else {
      Err(SolverError::Unsatisfiable(format!(
        "still overloaded after {} moves",
        self.max_moves
      )))
    }
  }
}
