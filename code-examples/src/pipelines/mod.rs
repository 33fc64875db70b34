use async_std::task::sleep;
use futures::StreamExt;
use futures::stream;
use std::time::Duration;

use resilient_pipes::CancellationSignal;
use resilient_pipes::streams::{bounded, cycle, fanout_n, filter_on_cancel, flatten};

// Example 1: An infinite generator cut down to a fixed number of values
pub async fn example_cycle_and_bound() {
    let signal = CancellationSignal::new();
    let token = signal.token();

    let colours = cycle(&token, vec!["red", "green", "blue"]);
    let first_seven: Vec<_> = bounded(&token, colours, 7).collect().await;
    println!("First seven: {:?}", first_seven);

    // Stops the generator that is still running behind `bounded`.
    signal.fire();
}

// Example 2: One producer, three consumers kept in lock-step
pub async fn example_fanout() {
    let signal = CancellationSignal::new();
    let token = signal.token();

    let mut readers = fanout_n(&token, stream::iter(1..=5), 3);
    for round in 1..=5 {
        let mut seen = Vec::new();
        for reader in readers.iter_mut() {
            seen.extend(reader.next().await);
        }
        println!("Round {}: every reader saw {:?}", round, seen);
    }
}

// Example 3: Flatten batches, and stop the pipeline half way through
pub async fn example_flatten() {
    let signal = CancellationSignal::new();
    let token = signal.token();

    let batches = stream::iter((0..).map(|batch: u32| stream::iter(batch * 10..batch * 10 + 3)));
    let mut values = filter_on_cancel(&token, flatten(&token, batches));

    let mut received = Vec::new();
    while let Some(value) = values.next().await {
        received.push(value);
        if received.len() == 8 {
            signal.fire();
        }
        sleep(Duration::from_millis(5)).await;
    }
    println!("Received before cancellation: {:?}", received);
}
