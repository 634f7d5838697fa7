//! Endpoint delegation: A hands one side of a sub-session to B, and B
//! finishes the delegated protocol with C running on its own thread.
//!
//! Run with: cargo run --example delegation

use duet::{close_done, exec, new_pair, recv_bind, run, send_then, Endpoint};

fn main() {
    let (sub_a, sub_c) = new_pair();

    let c = std::thread::spawn(move || {
        exec(
            &sub_c,
            recv_bind(|greeting: String| close_done(greeting)),
        )
    });

    let delegator = send_then(sub_a, close_done("delegated"));
    let acceptor = recv_bind(|ep: Endpoint| {
        exec(&ep, send_then("hello from B".to_string(), close_done(())));
        close_done("accepted")
    });

    let (a_result, b_result) = run(delegator, acceptor);
    let c_result = c.join().expect("c thread");

    println!("A: {a_result}");
    println!("B: {b_result}");
    println!("C received: {c_result}");
}
