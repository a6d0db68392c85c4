//! A todo list composed with a stats store: the todo store owns the
//! items and the filter, a derived hook exposes the visible subset, and
//! a sibling store pulls live counts across the registry.

use remodel_core::prelude::*;

#[derive(Clone, Debug, PartialEq)]
struct Todo {
    id: u32,
    text: String,
    done: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Filter {
    All,
    Active,
    Completed,
}

fn todos() -> StoreDef {
    create_store(
        StoreConfig::new("todos")
            .model("items", vec![Todo {
                id: 1,
                text: "learn remodel".into(),
                done: false,
            }])
            .model("filter", Filter::All)
            .model("next_id", 2u32)
            .hook("visible", |ctx: &HookCtx| {
                let items = ctx.state.get::<Vec<Todo>>("items").unwrap_or_default();
                let filter = ctx.state.get::<Filter>("filter").unwrap_or(Filter::All);
                items
                    .into_iter()
                    .filter(|todo| match filter {
                        Filter::All => true,
                        Filter::Active => !todo.done,
                        Filter::Completed => todo.done,
                    })
                    .collect::<Vec<Todo>>()
            })
            .action("add", |ctx| {
                let text = ctx.payload::<String>()?;
                let id = ctx.state().get::<u32>("next_id")?;
                ctx.set_model("next_id", |id: &u32| id + 1);
                Some(ctx.set_model("items", move |items: &Vec<Todo>| {
                    let mut next = items.clone();
                    next.push(Todo {
                        id,
                        text: text.clone(),
                        done: false,
                    });
                    next
                }))
            })
            .action("toggle", |ctx| {
                let id = ctx.payload::<u32>()?;
                Some(ctx.set_model("items", move |items: &Vec<Todo>| {
                    items
                        .iter()
                        .map(|todo| {
                            if todo.id == id {
                                Todo {
                                    done: !todo.done,
                                    ..todo.clone()
                                }
                            } else {
                                todo.clone()
                            }
                        })
                        .collect()
                }))
            })
            .action("set_filter", |ctx| {
                let filter = ctx.payload::<Filter>()?;
                Some(ctx.set_model("filter", move |_: &Filter| filter))
            }),
    )
}

fn stats() -> StoreDef {
    create_store(
        StoreConfig::new("stats")
            .model("open", 0usize)
            .action("refresh", |ctx| {
                let items = match ctx.model_state("todos") {
                    Ok(state) => state.get::<Vec<Todo>>("items")?,
                    Err(err) => {
                        log::warn!("stats could not reach the todo store: {err}");
                        return None;
                    }
                };
                let open = items.iter().filter(|todo| !todo.done).count();
                Some(ctx.set_model("open", move |_: &usize| open))
            }),
    )
}

fn print_visible(todos_def: &StoreDef, env: &Env) {
    let filter = todos_def
        .use_model_state::<Filter>(env, "filter")
        .unwrap_or(Filter::All);
    println!("-- {filter:?} --");
    for todo in todos_def
        .use_hook_return::<Vec<Todo>>(env, "visible")
        .unwrap_or_default()
    {
        let mark = if todo.done { 'x' } else { ' ' };
        println!("  [{mark}] {} {}", todo.id, todo.text);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let env = Env::new();
    let todos_def = todos();
    let combined = combine_models([todos_def.clone(), stats()]);
    combined.provide(&env, |registry| -> anyhow::Result<()> {
        let todo_actions = registry.model_actions("main", "todos")?;
        let stats_actions = registry.model_actions("main", "stats")?;

        todo_actions.invoke_with("add", "ship the demo".to_string());
        todo_actions.invoke_with("add", "write the changelog".to_string());
        todo_actions.invoke_with("toggle", 1u32);
        print_visible(&todos_def, &env);

        todo_actions.invoke_with("set_filter", Filter::Active);
        print_visible(&todos_def, &env);

        stats_actions.invoke("refresh");
        let open = registry
            .model_state("main", "stats")?
            .get::<usize>("open")
            .unwrap_or(0);
        println!("open todos: {open}");
        Ok(())
    })
}
