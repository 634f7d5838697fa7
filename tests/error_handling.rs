//! Throw/catch composed with session dispatch: recovery, short-circuiting,
//! and the stepping variants.

mod common;

use common::drive;
use duet::{
    advance_error, catch, close_done, exec, exec_error, exec_error_expr, expr_close_done,
    expr_recv_bind, expr_send_then, expr_throw, new_pair, rec, rec_expr, recv_bind, run_error,
    run_error_expr, send_then, step_error, throw, Advanced, Eff, Either, Expr, Operation, Stepped,
};

#[test]
fn error_run_success_is_right() {
    let client = send_then(42, close_done("ok".to_string()));
    let server = recv_bind(|n: i32| close_done(format!("got {n}")));

    let (client_result, server_result) = run_error::<String, _, _>(client, server);
    assert_eq!(client_result, Either::Right("ok".to_string()));
    assert_eq!(server_result, Either::Right("got 42".to_string()));
}

#[test]
fn uncaught_throw_is_left() {
    let client = send_then(42, throw::<String, String>("boom".to_string()));
    let server = recv_bind(|n: i32| close_done(format!("got {n}")));

    let (client_result, _) = run_error::<String, _, _>(client, server);
    assert_eq!(client_result, Either::Left("boom".to_string()));
}

#[test]
fn catch_recovers_and_session_continues() {
    // Catch body and handler are error-only; the recovered value then flows
    // through the session.
    let client = catch(
        throw::<String, String>("fail".to_string()),
        |e: String| Eff::pure(format!("recovered: {e}")),
    )
    .bind(|s: String| send_then(s.clone(), close_done(s)));

    let server = recv_bind(|s: String| close_done(s));

    let (client_result, server_result) = run_error::<String, _, _>(client, server);
    assert_eq!(client_result, Either::Right("recovered: fail".to_string()));
    assert_eq!(server_result, Either::Right("recovered: fail".to_string()));
}

#[test]
fn expr_error_run_success_is_right() {
    let client = expr_send_then(42, expr_close_done("ok".to_string()));
    let server = expr_recv_bind(|n: i32| expr_close_done(format!("got {n}")));

    let (client_result, server_result) = run_error_expr::<String, _, _>(client, server);
    assert_eq!(client_result, Either::Right("ok".to_string()));
    assert_eq!(server_result, Either::Right("got 42".to_string()));
}

#[test]
fn expr_uncaught_throw_is_left() {
    let client = expr_send_then(42, expr_throw::<String, String>("expr-boom".to_string()));
    let server = expr_recv_bind(|n: i32| expr_close_done(format!("got {n}")));

    let (client_result, _) = run_error_expr::<String, _, _>(client, server);
    assert_eq!(client_result, Either::Left("expr-boom".to_string()));
}

#[test]
fn exec_error_both_threads() {
    let (ep_a, ep_b) = new_pair();

    let client = std::thread::spawn(move || {
        exec_error_expr::<String, _>(
            &ep_a,
            expr_send_then(42, expr_close_done("ok".to_string())),
        )
    });
    let server_result = exec_error_expr::<String, _>(
        &ep_b,
        expr_recv_bind(|n: i32| expr_close_done(format!("got {n}"))),
    );
    let client_result = client.join().expect("client thread");

    assert_eq!(client_result, Either::Right("ok".to_string()));
    assert_eq!(server_result, Either::Right("got 42".to_string()));
}

#[test]
fn throw_short_circuits_before_pending_session_work() {
    // The throw arrives after one send; nothing downstream runs.
    let protocol = expr_send_then(1, expr_throw::<String, String>("step-boom".to_string()));

    let (ep_a, _peer) = new_pair();
    let result = exec_error_expr::<String, _>(&ep_a, protocol);
    assert_eq!(result, Either::Left("step-boom".to_string()));
}

#[test]
fn advance_error_would_block_then_completes() {
    let protocol = expr_recv_bind(|n: i32| expr_close_done(n));

    let susp = match step_error::<String, _>(protocol) {
        Stepped::Next(susp) => susp,
        Stepped::Done(_) => panic!("expected suspension for recv"),
    };

    let (ep_a, ep_b) = new_pair();

    // The receive ring is empty: suspension comes back unconsumed.
    let susp = match advance_error::<String, i32>(&ep_a, susp) {
        Advanced::Blocked(same) => same,
        _ => panic!("expected would-block on empty ring"),
    };

    let peer = std::thread::spawn(move || drive(&ep_b, expr_send_then(99, expr_close_done(()))));

    let mut state = Stepped::Next(susp);
    let result = loop {
        state = match state {
            Stepped::Done(result) => break result,
            Stepped::Next(susp) => match advance_error::<String, i32>(&ep_a, susp) {
                Advanced::Done(result) => break result,
                Advanced::Next(next) => Stepped::Next(next),
                Advanced::Blocked(same) => Stepped::Next(same),
            },
        };
    };
    peer.join().expect("peer thread");
    assert_eq!(result, Either::Right(99));
}

#[test]
fn catch_without_throw_is_transparent() {
    // Body succeeds: the handler never runs, the session continues.
    let (ep_a, ep_b) = new_pair();

    let peer = std::thread::spawn(move || {
        exec(&ep_b, recv_bind(|s: String| close_done(s)))
    });

    let protocol = catch(
        Eff::pure("ok".to_string()),
        |e: String| Eff::pure(format!("caught: {e}")),
    )
    .bind(|s: String| send_then(s.clone(), close_done(s)));

    let result = exec_error::<String, _>(&ep_a, protocol);
    peer.join().expect("peer thread");

    assert_eq!(result, Either::Right("ok".to_string()));
}

#[test]
fn catch_stepping_without_throw() {
    // Stepping through a successful catch: the error op executes inline.
    let body = Eff::pure("ok".to_string());
    let caught = catch(body, |e: String| Eff::pure(format!("caught: {e}")));
    let protocol = duet::reify(caught);

    let susp = match step_error::<String, _>(protocol) {
        Stepped::Next(susp) => susp,
        Stepped::Done(_) => panic!("expected suspension for catch"),
    };

    let (ep, _peer) = new_pair();
    let mut state = match advance_error::<String, String>(&ep, susp) {
        Advanced::Done(result) => Stepped::Done(result),
        Advanced::Next(next) => Stepped::Next(next),
        Advanced::Blocked(_) => panic!("error ops never block"),
    };
    let result = loop {
        state = match state {
            Stepped::Done(result) => break result,
            Stepped::Next(susp) => match advance_error::<String, String>(&ep, susp) {
                Advanced::Done(result) => Stepped::Done(result),
                Advanced::Next(next) => Stepped::Next(next),
                Advanced::Blocked(_) => panic!("error ops never block"),
            },
        };
    };
    assert_eq!(result, Either::Right("ok".to_string()));
}

#[test]
fn loop_throws_at_limit() {
    let client = rec(0, |i: i32| {
        if i >= 3 {
            throw::<String, Either<i32, String>>("limit".to_string())
        } else {
            send_then(i, Eff::pure(Either::Left(i + 1)))
        }
    });
    let server = recv_bind(|a: i32| {
        recv_bind(move |b: i32| recv_bind(move |c: i32| close_done(a + b + c)))
    });

    let (client_result, _) = run_error::<String, _, _>(client, server);
    assert_eq!(client_result, Either::Left("limit".to_string()));
}

#[test]
fn expr_loop_throws_at_limit() {
    let client = rec_expr(0, |i: i32| {
        if i >= 3 {
            expr_throw::<String, Either<i32, String>>("limit".to_string())
        } else {
            expr_send_then(i, Expr::pure(Either::Left(i + 1)))
        }
    });
    let server = expr_recv_bind(|a: i32| {
        expr_recv_bind(move |b: i32| expr_recv_bind(move |c: i32| expr_close_done(a + b + c)))
    });

    let (client_result, _) = run_error_expr::<String, _, _>(client, server);
    assert_eq!(client_result, Either::Left("limit".to_string()));
}

#[test]
fn exec_error_single_endpoint() {
    let (ep_a, ep_b) = new_pair();

    let peer = std::thread::spawn(move || {
        exec(&ep_b, recv_bind(|n: i32| close_done(format!("got {n}"))))
    });

    let result = exec_error::<String, _>(&ep_a, send_then(7, close_done("ok".to_string())));
    let peer_result = peer.join().expect("peer thread");

    assert_eq!(result, Either::Right("ok".to_string()));
    assert_eq!(peer_result, "got 7");
}

struct Bogus;

impl Operation for Bogus {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[test]
#[should_panic(expected = "unhandled effect in advance_error")]
fn advance_error_unhandled_effect_panics() {
    let susp = match step_error::<String, i32>(Expr::<i32>::perform(Bogus)) {
        Stepped::Next(susp) => susp,
        Stepped::Done(_) => panic!("expected suspension"),
    };
    let (ep, _peer) = new_pair();
    let _ = advance_error::<String, i32>(&ep, susp);
}

#[test]
#[should_panic(expected = "unhandled effect in session error handler")]
fn exec_error_unhandled_effect_panics() {
    let (ep, _peer) = new_pair();
    let _ = exec_error::<String, i32>(&ep, Eff::<i32>::perform(Bogus));
}
