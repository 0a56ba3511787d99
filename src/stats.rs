// SPDX-License-Identifier: Apache-2.0

//! Counters and phase timers, printed once at the end of a run.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Stats {
    start: Instant,

    // Linearization bookkeeping.
    pub total_circuit_lin_count: u64,
    pub unique_gb_calls: u64,
    pub circuit_enlarged_count: u64,
    pub max_depth_count: u64,
    pub circuit_cached_count: u64,
    pub fglm_calls: u64,
    pub msolve_calls: u64,
    pub lin_xor_constraint_count: u64,

    // Guess-and-prove.
    pub guess_calls: u64,
    pub sat_calls: u64,
    pub total_guesses: u64,
    pub max_guesses: u64,
    pub evaluated_guesses: u64,
    pub correct_guesses: u64,
    pub total_iterations: u64,
    pub max_iterations: u64,
    pub accuracy: Vec<f64>,
    pub iterations_on_level: Vec<u64>,

    // Vanishing monomials.
    pub van_mon_poly_count: u64,
    pub van_mon_prop_count: u64,
    pub van_mon_used_count: u64,

    // Reductions.
    pub linear_count: u64,
    pub non_linear_count: u64,

    // Phase timers.
    pub linearization_time: Duration,
    pub find_circuit_time: Duration,
    pub fglm_time: Duration,
    pub nf_time: Duration,
    pub matrix_time: Duration,
    pub gap_time: Duration,
    pub guess_time: Duration,
    pub proof_time: Duration,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            start: Instant::now(),
            total_circuit_lin_count: 0,
            unique_gb_calls: 0,
            circuit_enlarged_count: 0,
            max_depth_count: 0,
            circuit_cached_count: 0,
            fglm_calls: 0,
            msolve_calls: 0,
            lin_xor_constraint_count: 0,
            guess_calls: 0,
            sat_calls: 0,
            total_guesses: 0,
            max_guesses: 0,
            evaluated_guesses: 0,
            correct_guesses: 0,
            total_iterations: 0,
            max_iterations: 0,
            accuracy: vec![0.0; 100],
            iterations_on_level: vec![0; 100],
            van_mon_poly_count: 0,
            van_mon_prop_count: 0,
            van_mon_used_count: 0,
            linear_count: 0,
            non_linear_count: 0,
            linearization_time: Duration::ZERO,
            find_circuit_time: Duration::ZERO,
            fglm_time: Duration::ZERO,
            nf_time: Duration::ZERO,
            matrix_time: Duration::ZERO,
            gap_time: Duration::ZERO,
            guess_time: Duration::ZERO,
            proof_time: Duration::ZERO,
        }
    }
}

fn percent(a: f64, b: f64) -> f64 {
    if b != 0.0 {
        100.0 * a / b
    } else {
        0.0
    }
}

fn average(a: f64, b: f64) -> f64 {
    if b != 0.0 {
        a / b
    } else {
        0.0
    }
}

/// Peak resident set size in bytes, read from `/proc/self/status`.  Returns 0
/// when the information is unavailable.
fn maximum_resident_set_size() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmPeak:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0);
            return kb << 10;
        }
    }
    0
}

impl Stats {
    pub fn process_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn print(&self) {
        let secs = |d: Duration| d.as_secs_f64();
        let new = self.total_circuit_lin_count - self.circuit_cached_count;

        println!("[talisman]");
        println!("[talisman] STATISTICS:");
        println!(
            "[talisman] total linearization calls: {:13}",
            self.total_circuit_lin_count
        );
        println!(
            "[talisman] unique linearization calls:{:13}",
            self.unique_gb_calls
        );
        println!(
            "[talisman] sub-circuits enlarged:     {:13} (max: {} times)",
            self.circuit_enlarged_count, self.max_depth_count
        );
        println!(
            "[talisman] cached circuits found:     {:13} ({:6.2}% of total linearizations)",
            self.circuit_cached_count,
            percent(
                self.circuit_cached_count as f64,
                self.total_circuit_lin_count as f64
            )
        );
        println!(
            "[talisman]   guess and prove calls:   {:13} ({:6.2}% of new computations)",
            self.guess_calls,
            percent(self.guess_calls as f64, new as f64)
        );
        println!("[talisman]     sat calls:             {:13}", self.sat_calls);
        println!(
            "[talisman]     guessed poly:          {:13} (max: {:2}, avg: {:3.1})",
            self.total_guesses,
            self.max_guesses,
            average(self.total_guesses as f64, self.total_iterations as f64)
        );
        println!(
            "[talisman]     evaluated guessed poly:{:13} ({:6.2}% of total guesses)",
            self.evaluated_guesses,
            percent(self.evaluated_guesses as f64, self.total_guesses as f64)
        );
        println!(
            "[talisman]     correct guessed poly:  {:13} ({:6.2}% of evaluated guesses)",
            self.correct_guesses,
            percent(self.correct_guesses as f64, self.evaluated_guesses as f64)
        );
        println!(
            "[talisman]     iterations:            {:13} (max: {:2}, avg: {:3.1})",
            self.total_iterations,
            self.max_iterations,
            average(self.total_iterations as f64, self.guess_calls as f64)
        );
        print!("[talisman]     average accuracies:               ");
        for i in 0..self.max_iterations as usize {
            print!(
                "{:6.2}% ",
                average(self.accuracy[i], self.iterations_on_level[i] as f64)
            );
            if i + 1 < self.max_iterations as usize {
                print!("- ");
            }
        }
        println!();
        println!(
            "[talisman]   fglm calls:              {:13} ({:6.2}% of new computations)",
            self.fglm_calls,
            percent(self.fglm_calls as f64, new as f64)
        );
        println!(
            "[talisman]   msolve calls:            {:13} ({:6.2}% of new computations)",
            self.msolve_calls,
            percent(self.msolve_calls as f64, new as f64)
        );
        println!("[talisman]");
        println!("[talisman] VANISHING MONOMIALS:");
        println!(
            "[talisman] total number:              {:13}",
            self.van_mon_poly_count
        );
        println!(
            "[talisman] propagations:              {:13}",
            self.van_mon_prop_count
        );
        println!(
            "[talisman] applications:              {:13}",
            self.van_mon_used_count
        );
        println!("[talisman]");
        println!("[talisman] REDUCTIONS:");
        let total_red = self.linear_count + self.non_linear_count;
        println!(
            "[talisman] total reductions:          {:13}",
            total_red
        );
        println!(
            "[talisman] linear reductions:         {:13} ({:6.2}%)",
            self.linear_count,
            percent(self.linear_count as f64, total_red as f64)
        );
        println!(
            "[talisman] non-linear reductions:     {:13} ({:6.2}%)",
            self.non_linear_count,
            percent(self.non_linear_count as f64, total_red as f64)
        );
        println!("[talisman]");
        println!("[talisman] TIME AND MEMORY:");
        println!(
            "[talisman] maximum resident set size:     {:12.2} MB",
            maximum_resident_set_size() as f64 / (1u64 << 20) as f64
        );
        let end = self.process_time();
        println!(
            "[talisman] total process time:            {:13.3} seconds",
            end
        );
        println!(
            "[talisman] linearization time:            {:13.3} seconds ({:2.2}% of total time)",
            secs(self.linearization_time),
            percent(secs(self.linearization_time), end)
        );
        println!(
            "[talisman]   getting circuits time:       {:13.3} seconds",
            secs(self.find_circuit_time)
        );
        println!(
            "[talisman]   fglm time:                   {:13.3} seconds",
            secs(self.fglm_time)
        );
        println!(
            "[talisman]     normal forms:              {:13.3} seconds",
            secs(self.nf_time)
        );
        println!(
            "[talisman]     linear combinations:       {:13.3} seconds",
            secs(self.matrix_time)
        );
        println!(
            "[talisman]   guess-and-prove time:        {:13.3} seconds",
            secs(self.gap_time)
        );
        println!(
            "[talisman]     guessing:                  {:13.3} seconds",
            secs(self.guess_time)
        );
        println!(
            "[talisman]     proving:                   {:13.3} seconds",
            secs(self.proof_time)
        );
    }
}
