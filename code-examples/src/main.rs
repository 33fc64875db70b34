use async_std::task::block_on;

use crate::decorators::{example_circuit_breaker, example_guarded_call, example_rate_limiter};
use crate::pipelines::{example_cycle_and_bound, example_fanout, example_flatten};

mod decorators;
mod pipelines;

fn pipeline_examples() {
    println!("Running cycle + bounded example:");
    block_on(example_cycle_and_bound());

    println!("\nRunning fanout example:");
    block_on(example_fanout());

    println!("\nRunning flatten example:");
    block_on(example_flatten());
}

fn decorator_examples() {
    println!("\nRunning circuit breaker example:");
    block_on(example_circuit_breaker());

    println!("\nRunning rate limiter example:");
    block_on(example_rate_limiter());

    println!("\nRunning retry(breaker(throttle)) example:");
    block_on(example_guarded_call());
}

fn main() {
    pipeline_examples();
    decorator_examples();
}
