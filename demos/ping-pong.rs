//! Recursive ping-pong: the client doubles a counter through the peer until
//! it reaches 100, then signals the end of the session.
//!
//! Run with: cargo run --example ping-pong

use duet::{
    close_done, rec, recv_bind, run, select_l_then, select_r_then, send_then, Eff, Either,
};

fn main() {
    let server = rec((), |()| {
        recv_bind(|n: i32| {
            send_then(
                n * 2,
                duet::offer_branch(
                    || Eff::pure(Either::Right("finished")),
                    || Eff::pure(Either::Left(())),
                ),
            )
        })
    });

    let client = rec(1, |n: i32| {
        send_then(
            n,
            recv_bind(move |doubled: i32| {
                println!("client: {n} doubled to {doubled}");
                if doubled >= 100 {
                    select_l_then(close_done(Either::Right(doubled)))
                } else {
                    select_r_then(Eff::pure(Either::Left(doubled)))
                }
            }),
        )
    });

    let (client_result, server_result) = run(client, server);
    println!("client finished with {client_result}, server reports {server_result}");
}
