#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::prelude::*;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

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

    fn counter_def() -> StoreDef {
        create_store(
            StoreConfig::new("counter")
                .model("count", 0i32)
                .action("increment", |ctx| {
                    Some(ctx.set_model("count", |c: &i32| c + 1))
                })
                .action("decrement", |ctx| {
                    Some(ctx.set_model("count", |c: &i32| c - 1))
                })
                .action("add", |ctx| {
                    let amount = ctx.payload::<i32>()?;
                    Some(ctx.set_model("count", move |c: &i32| c + amount))
                })
                .action("noop", |_ctx| None),
        )
    }

    fn todos_def() -> StoreDef {
        create_store(
            StoreConfig::new("todos")
                .model("items", Vec::<Todo>::new())
                .model("filter", Filter::All)
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
                    let todo = ctx.payload::<Todo>()?;
                    Some(ctx.set_model("items", move |items: &Vec<Todo>| {
                        let mut next = items.clone();
                        next.push(todo.clone());
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

    #[test]
    fn counter_commits_resolve_one_two_three() {
        let env = Env::new();
        counter_def().provide(&env, |store| {
            let actions = store.actions();
            let mut resolved = Vec::new();
            for _ in 0..3 {
                let commit = actions.invoke("increment").unwrap();
                resolved.push(commit.value::<i32>().unwrap());
            }
            assert_eq!(resolved, vec![1, 2, 3]);
            assert_eq!(store.model_state::<i32>("count"), Some(3));
        });
    }

    #[test]
    fn sets_within_one_action_apply_in_issue_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let def = {
            let seen = seen.clone();
            create_store(
                StoreConfig::new("counter")
                    .model("count", 0i32)
                    .action("burst", move |ctx| {
                        let mut last = None;
                        for _ in 0..3 {
                            let commit = ctx.set_model("count", |c: &i32| c + 1);
                            // each commit is already observable here
                            seen.borrow_mut().push(commit.value::<i32>().unwrap());
                            last = Some(commit);
                        }
                        last
                    }),
            )
        };
        let env = Env::new();
        def.provide(&env, |store| {
            let commit = store.actions().invoke("burst").unwrap();
            assert_eq!(commit.value::<i32>(), Some(3));
        });
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn watching_one_slice_ignores_the_other() {
        let def = create_store(
            StoreConfig::new("pair")
                .model("a", 0i32)
                .model("b", 0i32)
                .action("bump_b", |ctx| Some(ctx.set_model("b", |b: &i32| b + 1))),
        );
        let env = Env::new();
        def.provide(&env, |store| {
            let a_hits = Rc::new(Cell::new(0));
            let b_hits = Rc::new(Cell::new(0));
            let _a = store.watch_model("a", {
                let a_hits = a_hits.clone();
                move |_: &i32| a_hits.set(a_hits.get() + 1)
            });
            let _b = store.watch_model("b", {
                let b_hits = b_hits.clone();
                move |_: &i32| b_hits.set(b_hits.get() + 1)
            });
            store.actions().invoke("bump_b");
            store.actions().invoke("bump_b");
            assert_eq!(a_hits.get(), 0);
            assert_eq!(b_hits.get(), 2);
        });
    }

    #[test]
    fn dropping_a_subscription_stops_notifications() {
        let env = Env::new();
        counter_def().provide(&env, |store| {
            let hits = Rc::new(Cell::new(0));
            let guard = store.watch_model("count", {
                let hits = hits.clone();
                move |_: &i32| hits.set(hits.get() + 1)
            });
            store.actions().invoke("increment");
            assert_eq!(hits.get(), 1);
            drop(guard);
            store.actions().invoke("increment");
            assert_eq!(hits.get(), 1);
        });
    }

    #[test]
    fn whole_state_set_touches_every_changed_slice_once() {
        let def = create_store(
            StoreConfig::new("pair")
                .model("a", 1i32)
                .model("b", 2i32)
                .action("bump_both", |ctx| {
                    Some(ctx.set(|s: &StateMap| {
                        s.clone()
                            .update("a", |a: &i32| a + 1)
                            .update("b", |b: &i32| b + 10)
                    }))
                }),
        );
        let env = Env::new();
        def.provide(&env, |store| {
            let a_hits = Rc::new(Cell::new(0));
            let _a = store.watch_model("a", {
                let a_hits = a_hits.clone();
                move |_: &i32| a_hits.set(a_hits.get() + 1)
            });
            let commit = store.actions().invoke("bump_both").unwrap();
            let state = commit.state().unwrap();
            assert_eq!(state.get::<i32>("a"), Some(2));
            assert_eq!(state.get::<i32>("b"), Some(12));
            assert_eq!(a_hits.get(), 1);
        });
    }

    #[test]
    fn action_with_no_sets_leaves_slice_identity_untouched() {
        let env = Env::new();
        counter_def().provide(&env, |store| {
            let before = store.state().get_raw("count").unwrap();
            store.actions().invoke("noop");
            let after = store.state().get_raw("count").unwrap();
            assert!(Rc::ptr_eq(&before, &after));
        });
    }

    #[test]
    fn payload_reaches_the_handler() {
        let env = Env::new();
        counter_def().provide(&env, |store| {
            let commit = store.actions().invoke_with("add", 41i32).unwrap();
            assert_eq!(commit.value::<i32>(), Some(41));
            assert_eq!(store.model_state::<i32>("count"), Some(41));
        });
    }

    #[test]
    fn bad_transform_rejects_commit_and_pipeline_continues() {
        init_logs();
        let def = create_store(
            StoreConfig::new("counter")
                .model("count", 0i32)
                .action("bad_type", |ctx| {
                    Some(ctx.set_model("count", |s: &String| s.clone()))
                })
                .action("bad_key", |ctx| {
                    Some(ctx.set_model("missing", |c: &i32| c + 1))
                })
                .action("increment", |ctx| {
                    Some(ctx.set_model("count", |c: &i32| c + 1))
                }),
        );
        let env = Env::new();
        def.provide(&env, |store| {
            let bad_type = store.actions().invoke("bad_type").unwrap();
            assert_eq!(
                bad_type.error(),
                Some(DispatchError::ModelTypeMismatch {
                    store: "counter".into(),
                    key: "count",
                })
            );
            let bad_key = store.actions().invoke("bad_key").unwrap();
            assert_eq!(
                bad_key.error(),
                Some(DispatchError::UnknownModel {
                    store: "counter".into(),
                    key: "missing",
                })
            );
            // the dropped requests didn't wedge the queue
            let commit = store.actions().invoke("increment").unwrap();
            assert_eq!(commit.value::<i32>(), Some(1));
        });
    }

    #[test]
    fn reentrant_set_from_a_subscriber_is_queued_fifo() {
        let env = Env::new();
        counter_def().provide(&env, |store| {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let fired = Rc::new(Cell::new(false));
            let actions = store.actions();
            let _guard = store.watch_model("count", {
                let seen = seen.clone();
                let fired = fired.clone();
                let actions = actions.clone();
                move |count: &i32| {
                    seen.borrow_mut().push(*count);
                    if !fired.get() {
                        fired.set(true);
                        actions.invoke("increment");
                    }
                }
            });
            let commit = store.actions().invoke("increment").unwrap();
            // the outer commit settled at its own scope, not the final one
            assert_eq!(commit.value::<i32>(), Some(1));
            assert_eq!(*seen.borrow(), vec![1, 2]);
            assert_eq!(store.model_state::<i32>("count"), Some(2));
        });
    }

    #[test]
    fn commit_continuation_can_issue_followup_sets() {
        let def = create_store(
            StoreConfig::new("counter")
                .model("count", 0i32)
                .action("bump_then_scale", |ctx| {
                    let first = ctx.set_model("count", |c: &i32| c + 1);
                    let setter = ctx.setter();
                    first.on_settle(move |_| {
                        setter.set_model("count", |c: &i32| c * 10);
                    });
                    Some(first)
                }),
        );
        let env = Env::new();
        def.provide(&env, |store| {
            store.actions().invoke("bump_then_scale");
            assert_eq!(store.model_state::<i32>("count"), Some(10));
        });
    }

    #[test]
    fn hook_recomputes_after_transitions() {
        let env = Env::new();
        todos_def().provide(&env, |store| {
            assert_eq!(store.hook_return::<Vec<Todo>>("visible"), Some(vec![]));
            store.actions().invoke_with(
                "add",
                Todo {
                    id: 1,
                    text: "write tests".into(),
                    done: false,
                },
            );
            let visible = store.hook_return::<Vec<Todo>>("visible").unwrap();
            assert_eq!(visible.len(), 1);
            store.actions().invoke_with("set_filter", Filter::Completed);
            assert_eq!(store.hook_return::<Vec<Todo>>("visible"), Some(vec![]));
        });
    }

    #[test]
    fn hook_skips_notification_when_output_is_equal() {
        let env = Env::new();
        todos_def().provide(&env, |store| {
            store.actions().invoke_with(
                "add",
                Todo {
                    id: 1,
                    text: "already done".into(),
                    done: true,
                },
            );
            let hits = Rc::new(Cell::new(0));
            let _guard = store.watch_hook("visible", {
                let hits = hits.clone();
                move |_: &Vec<Todo>| hits.set(hits.get() + 1)
            });
            // the filter slice changes, but the visible list is identical
            store.actions().invoke_with("set_filter", Filter::Completed);
            assert_eq!(store.model_state::<Filter>("filter"), Some(Filter::Completed));
            assert_eq!(hits.get(), 0);
            // a transition that does change the output notifies once
            store.actions().invoke_with("toggle", 1u32);
            assert_eq!(hits.get(), 1);
        });
    }

    #[test]
    fn nested_providers_shadow_per_slice() {
        let def = counter_def();
        let env = Env::new();
        def.provide(&env, |outer| {
            outer.actions().invoke("increment");
            assert_eq!(def.use_model_state::<i32>(&env, "count"), Some(1));
            def.provide(&env, |inner| {
                assert_eq!(def.use_model_state::<i32>(&env, "count"), Some(0));
                let actions = def.use_actions(&env).unwrap();
                actions.invoke("increment");
                actions.invoke("increment");
                assert_eq!(def.use_model_state::<i32>(&env, "count"), Some(2));
                assert_eq!(inner.model_state::<i32>("count"), Some(2));
            });
            // inner frame popped, outer binding visible again
            assert_eq!(def.use_model_state::<i32>(&env, "count"), Some(1));
        });
        assert_eq!(env.depth(), 0);
        assert_eq!(def.use_model_state::<i32>(&env, "count"), None);
    }

    #[test]
    fn env_subscriptions_resolve_to_the_nearest_provider() {
        let def = counter_def();
        let env = Env::new();
        def.provide(&env, |_store| {
            let hits = Rc::new(Cell::new(0));
            let _guard = def.subscribe_model(&env, "count", {
                let hits = hits.clone();
                move |_: &i32| hits.set(hits.get() + 1)
            });
            def.use_actions(&env).unwrap().invoke("increment");
            assert_eq!(hits.get(), 1);
            assert_eq!(
                def.use_store_state(&env).unwrap().get::<i32>("count"),
                Some(1)
            );
        });
    }

    #[test]
    fn undeclared_keys_degrade_with_diagnostics() {
        init_logs();
        let env = Env::new();
        counter_def().provide(&env, |store| {
            assert_eq!(store.model_state::<i32>("missing"), None);
            assert_eq!(store.hook_return::<i32>("missing"), None);
            // inert guards are safe to hold and drop
            let guard = store.watch_model("missing", |_: &i32| {});
            drop(guard);
            // wrong type on a declared key
            assert_eq!(store.model_state::<String>("count"), None);
        });
    }

    #[test]
    fn store_without_models_still_runs() {
        let env = Env::new();
        create_store(StoreConfig::new("empty")).provide(&env, |store| {
            assert!(store.state().is_empty());
            assert_eq!(store.model_state::<i32>("anything"), None);
            assert!(store.actions().invoke("anything").is_none());
        });
    }

    #[test]
    fn actions_handle_is_referentially_stable() {
        let env = Env::new();
        counter_def().provide(&env, |store| {
            let first = store.actions();
            store.actions().invoke("increment");
            let second = store.actions();
            assert_eq!(first.names(), second.names());
            // both handles drive the same live store
            first.invoke("increment");
            assert_eq!(store.model_state::<i32>("count"), Some(2));
        });
    }

    #[test]
    fn provider_scope_runs_cleanups_on_unmount() {
        let cleaned = Rc::new(Cell::new(false));
        let env = Env::new();
        counter_def().provide(&env, |_store| {
            let cleaned = cleaned.clone();
            on_cleanup(move || cleaned.set(true));
        });
        assert!(cleaned.get());
    }

    #[test]
    fn invoking_after_unmount_degrades() {
        let env = Env::new();
        let def = counter_def();
        let escaped = def.provide(&env, |store| store.actions());
        assert!(escaped.invoke("increment").is_none());
    }

    // -- composition --------------------------------------------------

    fn bridge_def() -> StoreDef {
        create_store(
            StoreConfig::new("bridge")
                .model("last", 0i32)
                .action("pull", |ctx| {
                    let count = ctx.model_state("counter").ok()?.get::<i32>("count")?;
                    Some(ctx.set_model("last", move |_: &i32| count))
                }),
        )
    }

    #[test]
    fn combined_stores_see_each_other_live() {
        let env = Env::new();
        combine_models([counter_def(), bridge_def()]).provide(&env, |registry| {
            let counter = registry.model_actions("test", "counter").unwrap();
            counter.invoke("increment");
            assert_eq!(
                registry
                    .model_state("test", "counter")
                    .unwrap()
                    .get::<i32>("count"),
                Some(1)
            );
            let bridge = registry.model_actions("test", "bridge").unwrap();
            let commit = bridge.invoke("pull").unwrap();
            assert_eq!(commit.value::<i32>(), Some(1));
            // live, not a snapshot from registration time
            counter.invoke("increment");
            assert_eq!(
                registry
                    .model_state("test", "counter")
                    .unwrap()
                    .get::<i32>("count"),
                Some(2)
            );
        });
    }

    #[test]
    fn unmounted_store_is_a_structural_fault() {
        let env = Env::new();
        let combined = combine_models([counter_def()]);
        let registry = combined.provide(&env, |registry| {
            assert!(registry.is_registered("counter"));
            registry.clone()
        });
        assert!(!registry.is_registered("counter"));
        assert_eq!(
            registry.model_state("test", "counter"),
            Err(CombineError::NotRegistered {
                caller: "test".into(),
                name: "counter".into(),
            })
        );
    }

    #[test]
    fn reading_a_sibling_before_it_mounts_reports_not_crashes() {
        let observed = Rc::new(RefCell::new(None));
        let def = {
            let observed = observed.clone();
            create_store(
                StoreConfig::new("eager")
                    .model("x", 0i32)
                    .action("peek", move |ctx| {
                        *observed.borrow_mut() = Some(ctx.model_state("missing"));
                        None
                    }),
            )
        };
        let env = Env::new();
        let registry = Registry::new();
        def.provide_composed(&env, &registry, |store| {
            store.actions().invoke("peek");
        });
        match observed.borrow_mut().take().unwrap() {
            Err(CombineError::NotRegistered { caller, name }) => {
                assert_eq!(caller, "eager.peek");
                assert_eq!(name, "missing");
            }
            other => panic!("expected NotRegistered, got {other:?}"),
        }
    }

    #[test]
    fn cross_store_access_outside_composition_is_flagged() {
        let observed = Rc::new(RefCell::new(None));
        let def = {
            let observed = observed.clone();
            create_store(
                StoreConfig::new("standalone")
                    .model("x", 0i32)
                    .action("peek", move |ctx| {
                        *observed.borrow_mut() = Some(ctx.model_state("anything"));
                        None
                    }),
            )
        };
        let env = Env::new();
        def.provide(&env, |store| {
            store.actions().invoke("peek");
        });
        assert!(matches!(
            observed.borrow_mut().take().unwrap(),
            Err(CombineError::NotComposed { .. })
        ));
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let env = Env::new();
        // two defs sharing a name: the inner registration is refused
        combine_models([counter_def(), counter_def()]).provide(&env, |registry| {
            assert_eq!(registry.names(), vec!["counter".to_string()]);
            let actions = registry.model_actions("test", "counter").unwrap();
            actions.invoke("increment");
            assert_eq!(
                registry
                    .model_state("test", "counter")
                    .unwrap()
                    .get::<i32>("count"),
                Some(1)
            );
        });
    }
}
