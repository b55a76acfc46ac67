use crate::scheduling::{PlacementModel, Solver, SolverError};
use smallvec::SmallVec;
use std::cmp::Ordering;

type Slots = SmallVec<[usize; 8]>;

/// Repairs overloaded hosts under hard capacity constraints.
///
/// Each overloaded host gives up the smallest workload whose departure makes it fit, or failing
/// that its largest workload, until it fits. The evicted workloads are then placed largest first,
/// each on the host it fits most tightly. A viable input is returned unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintSolver;

fn by_cpu(model: &PlacementModel) -> impl Fn(&usize, &usize) -> Ordering + '_ {
  move |a, b| {
    let (x, y) = (model.workloads[*a].cpu, model.workloads[*b].cpu);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
  }
}

impl Solver for ConstraintSolver {
  fn name(&self) -> &'static str {
    "constraint"
  }

  fn solve(&mut self, model: &PlacementModel) -> Result<Vec<usize>, SolverError> {
    let mut placement = model.placement.clone();
    if model.is_viable(&placement) {
      return Ok(placement);
    }
    let (mut cpu, mut mem) = model.loads(&placement);
    let mut on_host: Vec<Slots> = vec![Slots::new(); model.hosts.len()];
    for (w, &h) in placement.iter().enumerate() {
      on_host[h].push(w);
    }

    let mut evicted = SmallVec::<[usize; 16]>::new();
    for h in 0..model.hosts.len() {
      on_host[h].sort_by(by_cpu(model));
      while !model.fits(h, cpu[h], mem[h]) {
        let pick = on_host[h]
          .iter()
          .position(|&w| {
            let wl = &model.workloads[w];
            model.fits(h, cpu[h] - wl.cpu, mem[h] - wl.mem)
          })
          .or_else(|| on_host[h].len().checked_sub(1));
        let w = match pick {
          Some(i) => on_host[h].remove(i),
          None => {
            return Err(SolverError::Unsatisfiable(format!(
              "{} is over capacity with nothing on it",
              model.hosts[h]
            )))
          }
        };
        cpu[h] -= model.workloads[w].cpu;
        mem[h] -= model.workloads[w].mem;
        evicted.push(w);
      }
    }

    evicted.sort_by(|a, b| by_cpu(model)(b, a));
    for w in evicted {
      let wl = &model.workloads[w];
      let slack = |h: usize| model.cpu_capacity[h] - cpu[h] - wl.cpu;
      let best = (0..model.hosts.len())
        .filter(|&h| model.fits(h, cpu[h] + wl.cpu, mem[h] + wl.mem))
        .min_by(|&a, &b| slack(a).partial_cmp(&slack(b)).unwrap_or(Ordering::Equal));
      match best {
        Some(h) => {
          placement[w] = h;
          cpu[h] += wl.cpu;
          mem[h] += wl.mem;
        }
        None => return Err(SolverError::Unsatisfiable(format!("no host can take {}", wl.id))),
      }
    }
    Ok(placement)
  }
}
