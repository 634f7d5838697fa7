//! Branch selection: one side chooses, the other offers both continuations.
//!
//! Run with: cargo run --example branching

use duet::{close_done, offer_branch, recv_bind, run, select_l_then, send_then};

fn main() {
    let client = select_l_then(send_then(99, close_done("went left".to_string())));

    let server = offer_branch(
        || recv_bind(|n: i32| close_done(format!("left branch got {n}"))),
        || close_done("right branch".to_string()),
    );

    let (client_result, server_result) = run(client, server);
    println!("client: {client_result}");
    println!("server: {server_result}");
}
