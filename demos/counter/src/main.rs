//! Interactive counter driven from stdin: `+`, `-`, an amount like `+5`,
//! `0` to reset, `q` to quit.

use std::io::BufRead;

use remodel_core::prelude::*;

fn counter() -> StoreDef {
    create_store(
        StoreConfig::new("counter")
            .model("count", 0i64)
            .action("increment", |ctx| {
                Some(ctx.set_model("count", |c: &i64| c + 1))
            })
            .action("decrement", |ctx| {
                Some(ctx.set_model("count", |c: &i64| c - 1))
            })
            .action("increment_by", |ctx| {
                let amount = ctx.payload::<i64>()?;
                Some(ctx.set_model("count", move |c: &i64| c + amount))
            })
            .action("reset", |ctx| Some(ctx.set_model("count", |_: &i64| 0))),
    )
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let env = Env::new();
    counter().provide(&env, |store| -> anyhow::Result<()> {
        let _echo = store.watch_model("count", |count: &i64| {
            println!("count = {count}");
        });

        println!("counter ready: +, -, +N, -N, 0, q");
        let actions = store.actions();
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            match line.trim() {
                "" => {}
                "q" => break,
                "+" => {
                    actions.invoke("increment");
                }
                "-" => {
                    actions.invoke("decrement");
                }
                "0" => {
                    actions.invoke("reset");
                }
                other => match other.parse::<i64>() {
                    Ok(amount) => {
                        actions.invoke_with("increment_by", amount);
                    }
                    Err(_) => println!("unrecognized input: {other}"),
                },
            }
        }
        println!(
            "final count: {}",
            store.model_state::<i64>("count").unwrap_or(0)
        );
        Ok(())
    })
}
