//! Built-in targets hosted by the `forkcall` binary.
//!
//! The binary serves as its own worker, so anything registered here can be
//! called from the command line or, with the binary as the worker program,
//! from the library.

use crate::codec::Thrown;
use crate::registry::{Registry, TargetResult};
use anyhow::anyhow;
use serde_json::{Value, json};
use std::time::Duration;

const FAILURE_MESSAGE: &str = "Something broke.";

fn type_error(target: &str, expected: &str, got: Option<&Value>) -> Thrown {
    let got = got.map_or_else(|| "nothing".to_string(), Value::to_string);
    Thrown::native(
        "TypeError",
        format!("{} expects {} as its first argument, got {}", target, expected, got),
    )
}

fn first_number(target: &str, args: &[Value]) -> Result<f64, Thrown> {
    args.first()
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(|| type_error(target, "a non-negative number", args.first()))
}

async fn echo(args: Vec<Value>) -> TargetResult {
    Ok(args.into_iter().next().unwrap_or(Value::Null))
}

/// Integer inputs sum exactly while the total fits in `i64` or `u64`;
/// anything else falls back to a float total.
fn sum(args: Vec<Value>) -> TargetResult {
    let mut total = 0.0;
    let mut exact = Some(0i128);
    for (index, arg) in args.iter().enumerate() {
        let Some(n) = arg.as_f64() else {
            return Err(Thrown::native(
                "TypeError",
                format!("sum expects numbers, argument {} is {}", index, arg),
            ));
        };
        total += n;

        let int = arg
            .as_i64()
            .map(i128::from)
            .or_else(|| arg.as_u64().map(i128::from));
        exact = exact.zip(int).and_then(|(acc, int)| acc.checked_add(int));
    }

    match exact {
        Some(n) if i64::try_from(n).is_ok() => Ok(json!(n as i64)),
        Some(n) if u64::try_from(n).is_ok() => Ok(json!(n as u64)),
        _ => Ok(json!(total)),
    }
}

async fn sleep(args: Vec<Value>) -> TargetResult {
    let seconds = first_number("sleep", &args)?;
    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    Ok(args.into_iter().next().unwrap_or(Value::Null))
}

fn repeat(args: Vec<Value>) -> TargetResult {
    let count = first_number("repeat", &args)? as usize;
    Ok(Value::String("x".repeat(count)))
}

fn length(args: Vec<Value>) -> TargetResult {
    match args.first() {
        Some(Value::String(s)) => Ok(json!(s.chars().count())),
        other => Err(type_error("length", "a string", other)),
    }
}

fn fail(_: Vec<Value>) -> TargetResult {
    Err(anyhow!(FAILURE_MESSAGE).into())
}

async fn reject(_: Vec<Value>) -> TargetResult {
    tokio::task::yield_now().await;
    Err(Thrown::error(std::io::Error::other(FAILURE_MESSAGE)))
}

/// The registry served by the `forkcall` binary.
pub fn registry() -> Registry {
    Registry::new()
        .with_async_target("echo", echo)
        .with_target("sum", sum)
        .with_async_target("sleep", sleep)
        .with_target("repeat", repeat)
        .with_target("length", length)
        .with_target("fail", fail)
        .with_async_target("reject", reject)
        .with_target("reject-string", |_| Err(Thrown::from(FAILURE_MESSAGE)))
        .with_target("reject-value", |args| {
            Err(Thrown::value(json!({ "code": 42, "arguments": args })))
        })
        .with_target("panic", |_| panic!("{}", FAILURE_MESSAGE))
        .with_target("abort", |_| std::process::abort())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{NativeError, Outcome};
    use crate::worker::invoke;

    fn run(name: &str, args: Vec<Value>) -> Outcome {
        invoke(&registry(), name, args)
    }

    fn rejected_error(outcome: Outcome) -> NativeError {
        match outcome {
            Outcome::Rejected { reason: Thrown::Error(err) } => err,
            other => panic!("Expected error rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_names() {
        let names: Vec<_> = registry().names().map(String::from).collect();
        for expected in ["echo", "sum", "sleep", "repeat", "length", "fail", "reject", "panic", "abort"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_echo() {
        assert_eq!(run("echo", vec![json!("test")]), Outcome::Resolved { value: json!("test") });
        assert_eq!(run("echo", vec![]), Outcome::Resolved { value: Value::Null });
    }

    #[test]
    fn test_sum() {
        assert_eq!(
            run("sum", vec![json!(1), json!(2), json!(3)]),
            Outcome::Resolved { value: json!(6) }
        );
        assert_eq!(
            run("sum", vec![json!(1.5), json!(2)]),
            Outcome::Resolved { value: json!(3.5) }
        );
        assert_eq!(run("sum", vec![]), Outcome::Resolved { value: json!(0) });
        assert_eq!(
            run("sum", vec![json!(-5), json!(u64::MAX)]),
            Outcome::Resolved { value: json!(u64::MAX - 5) }
        );
        assert_eq!(rejected_error(run("sum", vec![json!("a")])).name, "TypeError");
    }

    #[test]
    fn test_sum_past_i64_max_stays_exact() {
        assert_eq!(
            run("sum", vec![json!(i64::MAX), json!(1)]),
            Outcome::Resolved { value: json!(i64::MAX as u64 + 1) }
        );
    }

    #[test]
    fn test_sum_past_u64_max_falls_back_to_float() {
        match run("sum", vec![json!(u64::MAX), json!(1)]) {
            Outcome::Resolved { value } => {
                assert!(value.is_f64());
                assert_eq!(value.as_f64(), Some(u64::MAX as f64 + 1.0));
            }
            other => panic!("Expected a float total, got {:?}", other),
        }

        match run("sum", vec![json!(i64::MIN), json!(-1)]) {
            Outcome::Resolved { value } => {
                assert_eq!(value.as_f64(), Some(i64::MIN as f64 - 1.0));
            }
            other => panic!("Expected a float total, got {:?}", other),
        }
    }

    #[test]
    fn test_sleep_resolves_its_argument() {
        assert_eq!(run("sleep", vec![json!(0)]), Outcome::Resolved { value: json!(0) });
        assert_eq!(rejected_error(run("sleep", vec![json!(-1)])).name, "TypeError");
    }

    #[test]
    fn test_repeat_and_length() {
        assert_eq!(run("repeat", vec![json!(3)]), Outcome::Resolved { value: json!("xxx") });
        assert_eq!(run("length", vec![json!("héllo")]), Outcome::Resolved { value: json!(5) });
        assert_eq!(rejected_error(run("length", vec![json!(1)])).name, "TypeError");
    }

    #[test]
    fn test_failures() {
        for name in ["fail", "reject"] {
            let err = rejected_error(run(name, vec![]));
            assert_eq!(err.name, "Error");
            assert_eq!(err.message, "Something broke.");
            assert!(err.stack.unwrap().starts_with("Error: Something broke."));
        }

        assert_eq!(
            run("reject-string", vec![]),
            Outcome::Rejected { reason: Thrown::Value(json!("Something broke.")) }
        );

        match run("reject-value", vec![json!(1)]) {
            Outcome::Rejected { reason: Thrown::Value(value) } => {
                assert_eq!(value, json!({ "code": 42, "arguments": [1] }));
            }
            other => panic!("Expected value rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_is_reported() {
        let err = rejected_error(run("panic", vec![]));
        assert_eq!(err.name, "Panic");
        assert!(err.message.contains("Something broke."));
    }
}
