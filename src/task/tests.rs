#[cfg(test)]
mod tests {
    use crate::task::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{Value, json};

    fn factory() -> TaskFactory {
        TaskFactory::default()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn managed(name: &str) -> TaskDef {
        TaskDef::define_managed(name, DefineSettings::default()).unwrap()
    }

    fn returning(value: Value) -> Option<ExecuteFn> {
        Some(execute_fn(move |_, _| Ok(Produced::Value(value.clone()))))
    }

    // Helper building root -> [a, b -> [c]]
    fn create_test_tree() -> (TaskDef, Task) {
        let root = managed("root");
        root.define_sub_tasks(&["a", "b"]).unwrap();
        root.sub_task_def("b")
            .unwrap()
            .define_sub_task("c", None, DefineSettings::default())
            .unwrap();
        let task = factory().create_task(&root, CreateOptions::default());
        (root, task)
    }

    #[test]
    fn test_task_creation_mirrors_definition() {
        let (def, task) = create_test_tree();

        assert_eq!(task.name(), "root");
        assert!(task.definition().ptr_eq(&def));
        assert!(task.unstarted());
        assert_eq!(task.attempts(), 0);
        assert_eq!(task.sub_tasks().len(), 2);
        assert_eq!(task.find("b/c").unwrap().path(), "root/b/c");
        assert_eq!(task.find("b/c").unwrap().root(), task);
        assert_eq!(task.all_tasks().len(), 4);
        assert!(task.find("b/missing").is_none());
        assert!(!task.is_master());
    }

    #[test]
    fn test_start_counts_attempts_once() {
        let (_, task) = create_test_tree();

        task.start(at(1));
        assert!(task.started());
        assert_eq!(task.attempts(), 1);
        assert_eq!(task.total_attempts(), 1);
        assert_eq!(task.began(), Some(at(1)));

        // Re-entrant start keeps the original time and counters
        task.start(at(2));
        assert_eq!(task.began(), Some(at(1)));
        assert_eq!(task.attempts(), 1);

        // A retry after failure is a new attempt
        task.fail("boom");
        task.start(at(3));
        assert!(task.started());
        assert_eq!(task.attempts(), 2);
        assert_eq!(task.total_attempts(), 2);
        assert_eq!(task.began(), Some(at(3)));
    }

    #[test]
    fn test_reset_keeps_counters_and_finalised_states() {
        let (_, task) = create_test_tree();
        task.start(at(1));
        task.fail("boom");
        let a = task.sub_task("a").unwrap();
        a.start(at(1));
        a.complete(json!(1), CompleteOptions::default());
        task.find("b/c").unwrap().start(at(1));

        task.reset();

        assert!(task.unstarted());
        assert_eq!(task.attempts(), 1);
        assert_eq!(task.total_attempts(), 1);
        assert!(a.completed());
        assert!(task.find("b/c").unwrap().unstarted());
    }

    #[test]
    fn test_complete_records_result_and_duration() {
        let (_, task) = create_test_tree();
        task.start(at(1));
        task.succeed(json!({"rows": 3}), CompleteOptions::default());

        assert!(task.completed());
        assert_eq!(task.state(), TaskState::SUCCEEDED);
        assert_eq!(task.result(), Some(json!({"rows": 3})));
        assert!(task.ended().is_some());
        assert!(task.took().unwrap() > 0);
    }

    #[test]
    fn test_override_ordering() {
        let (_, task) = create_test_tree();

        // A later failure beats an earlier success
        task.start(at(1));
        task.complete(json!("done"), CompleteOptions::default());
        task.fail("late error");
        assert!(task.failed());
        assert_eq!(task.error().as_deref(), Some("late error"));
        assert_eq!(task.result(), None);

        // The first of several failures sticks
        task.fail("second error");
        assert_eq!(task.error().as_deref(), Some("late error"));

        // A later success beats an earlier failure
        task.succeed(json!("recovered"), CompleteOptions::default());
        assert!(task.completed());

        // TimedOut needs an explicit override to become Completed
        let (_, slow) = create_test_tree();
        slow.start(at(1));
        slow.timeout(Some("too slow".to_string()), TimeoutOptions::default());
        slow.complete(json!(1), CompleteOptions::default());
        assert!(slow.timed_out());
        slow.complete(json!(1), CompleteOptions::override_timed_out());
        assert!(slow.completed());
    }

    #[test]
    fn test_timeout_guards() {
        let (_, task) = create_test_tree();

        task.timeout(None, TimeoutOptions::default());
        assert!(task.unstarted());
        task.timeout(
            None,
            TimeoutOptions {
                override_unstarted: true,
                ..Default::default()
            },
        );
        assert!(task.timed_out());

        let (_, task) = create_test_tree();
        task.start(at(1));
        task.complete(json!(1), CompleteOptions::default());
        task.timeout(None, TimeoutOptions::default());
        assert!(task.completed());
        task.timeout(
            None,
            TimeoutOptions {
                override_completed: true,
                ..Default::default()
            },
        );
        assert!(task.timed_out());

        // Already timed out: failures and further timeouts are ignored
        task.fail("boom");
        task.timeout_as("Expired", None, TimeoutOptions::default());
        assert_eq!(task.state().name(), "TimedOut");

        // A timeout may replace a failure
        let (_, task) = create_test_tree();
        task.start(at(1));
        task.fail("boom");
        task.timeout(Some("slow".to_string()), TimeoutOptions::default());
        assert!(task.timed_out());
        assert_eq!(task.error().as_deref(), Some("slow"));
    }

    #[test]
    fn test_timeout_can_reverse_attempt() {
        let (_, task) = create_test_tree();
        task.start(at(1));
        task.timeout(
            None,
            TimeoutOptions {
                reverse_attempt: true,
                ..Default::default()
            },
        );
        assert!(task.timed_out());
        assert_eq!(task.attempts(), 0);
        assert_eq!(task.total_attempts(), 0);
    }

    #[test]
    fn test_attempt_counters() {
        let (_, task) = create_test_tree();
        task.start(at(1));
        task.fail("boom");
        task.start(at(2));
        assert_eq!((task.attempts(), task.total_attempts()), (2, 2));

        task.decrement_attempts();
        task.increment_attempts();
        assert_eq!((task.attempts(), task.total_attempts()), (2, 2));

        task.revert_attempts();
        assert_eq!((task.attempts(), task.total_attempts()), (0, 2));
        task.decrement_attempts();
        assert_eq!(task.attempts(), 0);
        assert!(task.attempts() <= task.total_attempts());
    }

    #[test]
    fn test_rejected_is_absorbing() {
        let (_, task) = create_test_tree();
        task.start(at(1));
        task.discard("duplicate", Some("seen before".to_string()), false);
        let before = task.state();

        task.complete(json!(1), CompleteOptions::override_timed_out());
        task.succeed(json!(1), CompleteOptions::default());
        task.fail("boom");
        task.timeout(
            None,
            TimeoutOptions {
                override_completed: true,
                override_unstarted: true,
                reverse_attempt: false,
            },
        );
        task.start(at(2));
        task.reset();

        assert_eq!(task.state(), before);
        assert_eq!(task.reason().as_deref(), Some("duplicate"));
        assert_eq!(task.error().as_deref(), Some("seen before"));
        assert_eq!(task.reject("again", None, false), 0);
    }

    #[test]
    fn test_recursive_reject_counts_transitions() {
        let (_, task) = create_test_tree();
        let a = task.sub_task("a").unwrap();
        a.start(at(1));
        a.complete(json!(1), CompleteOptions::default());

        let rejected = task.abandon("shutdown", None, true);

        assert_eq!(rejected, 3);
        assert!(a.completed());
        assert!(task.find("b/c").unwrap().rejected());
        assert_eq!(task.state().name(), "Abandoned");
        assert!(task.is_fully_finalised());
        assert_eq!(task.reject("again", None, true), 0);
    }

    #[test]
    fn test_non_recursive_reject_leaves_sub_tasks() {
        let (_, task) = create_test_tree();
        assert_eq!(task.reject("no", None, false), 1);
        assert!(task.rejected());
        assert!(task.sub_task("a").unwrap().unstarted());
        assert!(!task.is_fully_finalised());
    }

    #[test]
    fn test_frozen_task_ignores_mutators() {
        let (_, task) = create_test_tree();
        task.freeze();
        assert!(task.is_frozen());
        assert!(task.find("b/c").unwrap().is_frozen());

        task.start(at(1));
        task.complete(json!(1), CompleteOptions::default());
        task.fail("boom");
        task.increment_attempts();
        assert_eq!(task.reject("no", None, true), 0);

        assert!(task.unstarted());
        assert_eq!(task.attempts(), 0);
    }

    #[test]
    fn test_master_seeded_from_slaves() {
        let def = managed("job");
        let s1 = factory().create_task(&def, CreateOptions::default());
        let s2 = factory().create_task(&def, CreateOptions::default());
        s1.start(at(1));
        s1.fail("boom");
        s1.start(at(2));
        s2.start(at(3));
        s2.complete(json!(1), CompleteOptions::default());

        let master = factory()
            .create_master_task(&def, vec![s1.clone(), s2.clone()], CreateOptions::default())
            .unwrap();

        assert!(master.is_master());
        assert_eq!(master.attempts(), 1);
        assert_eq!(master.total_attempts(), 1);
        assert_eq!(master.began(), Some(at(3)));
        assert_eq!(master.ended(), s2.ended());
        assert!(master.started());
    }

    #[test]
    fn test_master_fail_skips_rejected_slaves() {
        let def = managed("job");
        let s1 = factory().create_task(&def, CreateOptions::default());
        let s2 = factory().create_task(&def, CreateOptions::default());
        s2.reject("obsolete", None, false);
        let s2_state = s2.state();

        let master = factory()
            .create_master_task(&def, vec![s1.clone(), s2.clone()], CreateOptions::default())
            .unwrap();
        assert!(master.unstarted());

        master.fail("err");

        assert!(master.failed());
        assert_eq!(s1.state(), TaskState::failed("err"));
        assert_eq!(s2.state(), s2_state);
    }

    #[test]
    fn test_master_fan_out_reaches_nested_slaves() {
        let def = managed("job");
        let leaf = factory().create_task(&def, CreateOptions::default());
        let middle = factory()
            .create_master_task(&def, vec![leaf.clone()], CreateOptions::default())
            .unwrap();
        let top = factory()
            .create_master_task(&def, vec![middle.clone()], CreateOptions::default())
            .unwrap();

        top.start(at(1));
        top.increment_attempts();

        assert!(leaf.started());
        assert_eq!(leaf.attempts(), 2);
        assert_eq!(middle.attempts(), 2);
        assert_eq!(top.attempts(), 2);
    }

    #[test]
    fn test_master_sub_tasks_drive_slave_sub_tasks() {
        let (def, s1) = create_test_tree();
        let s2 = factory().create_task(&def, CreateOptions::default());
        let master = factory()
            .create_master_task(&def, vec![s1.clone(), s2.clone()], CreateOptions::default())
            .unwrap();

        let step = master.find("b/c").unwrap();
        assert!(step.is_master());
        assert_eq!(step.slave_tasks().len(), 2);

        step.start(at(1));
        step.complete(json!("ok"), CompleteOptions::default());
        assert!(s1.find("b/c").unwrap().completed());
        assert!(s2.find("b/c").unwrap().completed());
        assert!(s1.sub_task("a").unwrap().unstarted());
    }

    #[test]
    fn test_create_master_task_requires_same_definition() {
        let def = managed("job");
        let other = managed("job");
        let stranger = factory().create_task(&other, CreateOptions::default());

        let err = factory()
            .create_master_task(&def, vec![stranger], CreateOptions::default())
            .unwrap_err();
        assert!(matches!(err, FactoryError::SlaveDefinitionMismatch { .. }));
    }

    #[test]
    fn test_set_slave_tasks_guards() {
        let def = managed("job");
        let a = factory().create_task(&def, CreateOptions::default());
        let b = factory().create_task(&def, CreateOptions::default());
        let c = factory().create_task(&def, CreateOptions::default());

        assert!(matches!(
            a.set_slave_tasks(vec![a.clone()]),
            Err(FactoryError::SlaveCycle { .. })
        ));

        a.set_slave_tasks(vec![b.clone()]).unwrap();
        assert!(matches!(
            b.set_slave_tasks(vec![a.clone()]),
            Err(FactoryError::SlaveCycle { .. })
        ));
        assert!(matches!(
            a.set_slave_tasks(vec![c]),
            Err(FactoryError::SlavesAlreadySet { .. })
        ));

        let stranger = factory().create_task(&managed("other"), CreateOptions::default());
        assert!(matches!(
            b.set_slave_tasks(vec![stranger]),
            Err(FactoryError::SlaveDefinitionMismatch { .. })
        ));

        a.fail("boom");
        assert!(b.failed());
    }

    #[test]
    fn test_synchronous_execution_completes_task() {
        let def = TaskDef::define_task("A", returning(json!("x")), DefineSettings::default())
            .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());

        let returned = task.execute(&Value::Null);

        match returned {
            Returned::Normal(Ok(Produced::Value(value))) => assert_eq!(value, json!("x")),
            other => panic!("Expected a plain value, got {:?}", other),
        }
        assert!(task.completed());
        assert_eq!(task.result(), Some(json!("x")));
        assert_eq!(task.attempts(), 1);
        assert!(task.outcome().unwrap().is_success());
        assert!(task.done_future().is_some());
    }

    #[test]
    fn test_thrown_error_is_captured() {
        let def = TaskDef::define_task(
            "A",
            Some(execute_fn(|_, _| Err(anyhow::anyhow!("bad item")))),
            DefineSettings::default(),
        )
        .unwrap();
        let task = factory().create_task(
            &def,
            CreateOptions::with_return_mode(ReturnMode::SuccessOrFailure),
        );

        match task.execute(&json!({"id": 7})) {
            Returned::Outcome(Outcome::Failure(error)) => assert_eq!(error.to_string(), "bad item"),
            other => panic!("Expected a failure outcome, got {:?}", other),
        }
        assert!(task.failed());
        assert_eq!(task.error().as_deref(), Some("bad item"));
    }

    #[test]
    fn test_nested_refusal_fails_outer_task() {
        let inner_def = TaskDef::define_task("inner", returning(json!(1)), DefineSettings::default())
            .unwrap();
        let inner = factory().create_task(&inner_def, CreateOptions::default());
        inner.freeze();

        let def = TaskDef::define_task(
            "outer",
            Some(execute_fn(move |_, _| match inner.execute(&Value::Null) {
                Returned::Normal(Err(error)) => Err(error.into()),
                _ => Ok(Produced::value("unexpected")),
            })),
            DefineSettings::default(),
        )
        .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());

        match task.execute(&Value::Null) {
            Returned::Normal(Err(error)) => {
                assert!(error.is_protocol_error());
                assert_eq!(error.as_label(), "frozen");
            }
            other => panic!("Expected the inner refusal, got {:?}", other),
        }
        assert!(task.failed());
    }

    #[tokio::test]
    async fn test_rejected_future_fails_task() {
        let def = TaskDef::define_task(
            "A",
            Some(execute_fn(|_, _| {
                Ok(Produced::future(async {
                    Err::<Value, anyhow::Error>(anyhow::anyhow!("E"))
                }))
            })),
            DefineSettings::default(),
        )
        .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());

        let returned = task.execute(&Value::Null);
        assert!(matches!(returned, Returned::Normal(Ok(Produced::Pending(_)))));

        let done = task.done_future().unwrap().await;
        assert_eq!(done.unwrap_err().to_string(), "E");
        assert!(task.failed());
        assert_eq!(task.error().as_deref(), Some("E"));
    }

    #[tokio::test]
    async fn test_pending_value_settles_later() {
        let (sender, receiver) = tokio::sync::oneshot::channel::<Value>();
        let receiver = std::sync::Mutex::new(Some(receiver));
        let def = TaskDef::define_task(
            "A",
            Some(execute_fn(move |_, _| {
                let receiver = receiver
                    .lock()
                    .unwrap()
                    .take()
                    .ok_or_else(|| anyhow::anyhow!("already executed"))?;
                Ok(Produced::future(async move {
                    Ok::<Value, anyhow::Error>(receiver.await?)
                }))
            })),
            DefineSettings::default(),
        )
        .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());

        task.execute(&Value::Null);
        assert!(task.started());

        sender.send(json!(42)).unwrap();
        let values = task.done_future().unwrap().await.unwrap();
        assert_eq!(values, vec![json!(42)]);
        assert!(task.completed());
        assert_eq!(task.result(), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_done_reports_first_failure_in_list_order() {
        let def = TaskDef::define_task(
            "A",
            Some(execute_fn(|_, _| {
                Ok(Produced::all([
                    Produced::value(1),
                    Produced::future(async { Err::<Value, _>(anyhow::anyhow!("first")) }),
                    Produced::future(async { Err::<Value, _>(anyhow::anyhow!("second")) }),
                ]))
            })),
            DefineSettings::default(),
        )
        .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());

        task.execute(&Value::Null);
        let error = task.done_future().unwrap().await.unwrap_err();
        assert_eq!(error.to_string(), "first");
        assert_eq!(task.error().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_promise_mode_wraps_synchronous_results() {
        let def = TaskDef::define_task("A", returning(json!(5)), DefineSettings::default())
            .unwrap();
        let task =
            factory().create_task(&def, CreateOptions::with_return_mode(ReturnMode::Promise));

        let returned = task.execute(&Value::Null);
        assert!(returned.is_future());
        assert_eq!(returned.into_future().await.unwrap(), json!(5));
        assert!(task.completed());
    }

    #[tokio::test]
    async fn test_promise_mode_resolves_lists_to_arrays() {
        let nested = execute_fn(|_, _| {
            Ok(Produced::all([
                Produced::value(1),
                Produced::all([Produced::value(2), Produced::value(3)]),
            ]))
        });
        let def = TaskDef::define_task("A", Some(nested.clone()), DefineSettings::default())
            .unwrap();

        let task =
            factory().create_task(&def, CreateOptions::with_return_mode(ReturnMode::Promise));
        let value = task.execute(&Value::Null).into_future().await.unwrap();
        assert_eq!(value, json!([1, [2, 3]]));
        assert_eq!(task.result(), Some(json!([1, [2, 3]])));

        let flattening = TaskFactory::new(
            FactorySettings::default(),
            FactoryOptions {
                return_mode: ReturnMode::Promise,
                done: DoneFlattenOptions {
                    flatten_nested: true,
                },
            },
        );
        let task = flattening.create_task(&def, CreateOptions::default());
        let value = task.execute(&Value::Null).into_future().await.unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_awaiting_returned_value_settles_task_without_runtime() {
        let def = TaskDef::define_task(
            "A",
            Some(execute_fn(|_, _| {
                Ok(Produced::future(async { Ok::<Value, anyhow::Error>(json!(1)) }))
            })),
            DefineSettings::default(),
        )
        .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());

        let pending = match task.execute(&Value::Null) {
            Returned::Normal(Ok(Produced::Pending(pending))) => pending,
            other => panic!("Expected a pending value, got {:?}", other),
        };
        assert!(task.started());

        assert_eq!(futures::executor::block_on(pending).unwrap(), json!(1));
        assert!(task.completed());
        assert_eq!(task.result(), Some(json!(1)));
    }

    #[test]
    fn test_awaiting_returned_elements_fails_task_without_runtime() {
        let (sender, receiver) = futures::channel::oneshot::channel::<Value>();
        let receiver = std::sync::Mutex::new(Some(receiver));
        let def = TaskDef::define_task(
            "A",
            Some(execute_fn(move |_, _| {
                let receiver = receiver
                    .lock()
                    .unwrap()
                    .take()
                    .ok_or_else(|| anyhow::anyhow!("already executed"))?;
                Ok(Produced::all([
                    Produced::future(async move { Ok::<Value, anyhow::Error>(receiver.await?) }),
                    Produced::future(async { Err::<Value, _>(anyhow::anyhow!("broken")) }),
                ]))
            })),
            DefineSettings::default(),
        )
        .unwrap();
        let task = factory().create_task(
            &def,
            CreateOptions::with_return_mode(ReturnMode::SuccessOrFailure),
        );

        let elements = match task.execute(&Value::Null) {
            Returned::Outcome(Outcome::Success(Produced::All(elements))) => elements,
            other => panic!("Expected a list of elements, got {:?}", other),
        };
        let mut elements = elements.into_iter();
        let (first, second) = match (elements.next(), elements.next()) {
            (Some(first), Some(second)) => (first, second),
            other => panic!("Expected two elements, got {:?}", other),
        };

        // The failing element settles first but the list is not complete yet
        let error = futures::executor::block_on(second.settle()).unwrap_err();
        assert_eq!(error.to_string(), "broken");
        assert!(task.started());

        sender.send(json!("late")).unwrap();
        assert_eq!(futures::executor::block_on(first.settle()).unwrap(), json!("late"));
        assert!(task.failed());
        assert_eq!(task.error().as_deref(), Some("broken"));
    }

    #[test]
    fn test_frozen_task_refuses_execution() {
        let def = TaskDef::define_task("A", returning(json!("x")), DefineSettings::default())
            .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());
        task.freeze();

        match task.execute(&Value::Null) {
            Returned::Normal(Err(ExecutionError::Frozen { task: name })) => assert_eq!(name, "A"),
            other => panic!("Expected a frozen error, got {:?}", other),
        }
        assert!(task.unstarted());
        assert!(task.outcome().is_none());
    }

    #[test]
    fn test_finalised_task_refuses_execution() {
        let def = TaskDef::define_task("A", returning(json!("x")), DefineSettings::default())
            .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());
        task.execute(&Value::Null);
        assert!(task.is_fully_finalised());

        let outcome = task.execute(&Value::Null).into_outcome();
        assert!(matches!(
            outcome.error(),
            Some(ExecutionError::Finalised { .. })
        ));
        assert_eq!(task.attempts(), 1);
    }

    #[test]
    fn test_managed_task_is_not_executable() {
        let (def, task) = create_test_tree();
        assert!(matches!(
            task.execute(&Value::Null),
            Returned::Normal(Err(ExecutionError::NotExecutable { .. }))
        ));

        // An adapter can still drive a managed task with an explicit function
        let adapter = factory().generate_execute(&task, execute_fn(|_, _| Ok(Produced::value(true))));
        assert!(adapter.task().definition().ptr_eq(&def));
        adapter.call(&Value::Null);
        assert!(task.completed());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (_, task) = create_test_tree();
        task.start(at(1));
        task.fail("boom");
        let a = task.sub_task("a").unwrap();
        a.start(at(2));
        a.complete_as("Skipped", json!(null), CompleteOptions::default());
        let c = task.find("b/c").unwrap();
        c.start(at(3));
        c.discard("stale", Some("old data".to_string()), false);

        let json = task.to_json().unwrap();
        let like = TaskLike::from_json(&json).unwrap();
        let restored = factory().reconstruct_tasks_from_root_task_like(&like, CreateOptions::default());

        for (original, copy) in task.all_tasks().iter().zip(restored.all_tasks()) {
            assert_eq!(original.path(), copy.path());
            assert_eq!(original.state(), copy.state());
            assert_eq!(original.attempts(), copy.attempts());
            assert_eq!(original.total_attempts(), copy.total_attempts());
            assert_eq!(original.began(), copy.began());
            assert_eq!(original.took(), copy.took());
            assert_eq!(original.ended(), copy.ended());
        }
        assert!(restored.is_unusable());
        assert_eq!(restored.all_tasks().len(), 4);
    }

    #[test]
    fn test_snapshot_shape() {
        let def = TaskDef::define_task("A", returning(json!(1)), DefineSettings::default())
            .unwrap();
        let task = factory().create_task(&def, CreateOptions::default());
        let value: Value = serde_json::from_str(&task.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "name": "A",
                "state": {"kind": "unstarted"},
                "attempts": 0,
                "totalAttempts": 0,
                "executable": true
            })
        );

        let slave = factory().create_task(&def, CreateOptions::default());
        let master = factory()
            .create_master_task(&def, vec![slave], CreateOptions::default())
            .unwrap();
        assert!(!master.to_json().unwrap().contains("slave"));
    }

    #[test]
    fn test_legacy_snapshot_is_accepted() {
        let like = TaskLike::from_value(json!({
            "name": "old",
            "completed": true,
            "attempts": 1,
            "total": 2,
            "subTasks": [
                {"name": "fetch", "timedOut": true, "error": "slow", "attempts": 1, "total": 1},
                {"name": "store", "rejected": true, "reason": "gone"}
            ]
        }))
        .unwrap();
        let task = factory().reconstruct_tasks_from_root_task_like(&like, CreateOptions::default());

        assert_eq!(task.state(), TaskState::COMPLETED);
        assert_eq!(task.total_attempts(), 2);
        let fetch = task.sub_task("fetch").unwrap();
        assert!(fetch.timed_out());
        assert_eq!(fetch.error().as_deref(), Some("slow"));
        assert_eq!(task.sub_task("store").unwrap().reason().as_deref(), Some("gone"));
    }

    #[test]
    fn test_reconstructed_definitions_are_unusable() {
        let like = TaskLike::from_value(json!({
            "name": "A",
            "executable": true,
            "subTasks": [{"name": "b"}]
        }))
        .unwrap();
        let def = factory().reconstruct_task_defs_from_root_task_like(&like);

        assert!(def.is_unusable());
        assert!(def.is_executable());
        assert!(def.sub_task_def("b").unwrap().is_unusable());
        assert!(def.sub_task_def("b").unwrap().is_managed());

        let task = factory().create_task(&def, CreateOptions::default());
        let placeholder = def.execute_fn().unwrap();
        let error: ExecutionError = placeholder(&task, &Value::Null).unwrap_err().into();
        assert!(matches!(error, ExecutionError::Unusable { .. }));

        assert!(matches!(
            task.execute(&Value::Null),
            Returned::Normal(Err(ExecutionError::Unusable { .. }))
        ));
        assert!(task.unstarted());
    }

    #[test]
    fn test_reincarnation_merges_active_definitions_with_history() {
        let job = managed("job");
        job.define_sub_tasks(&["fetch", "store"]).unwrap();

        let priors = vec![
            TaskLike::from_value(json!({
                "name": "job",
                "state": {"kind": "failed", "error": "crashed"},
                "attempts": 2,
                "totalAttempts": 3,
                "subTasks": [
                    {"name": "fetch", "state": {"kind": "completed"}, "attempts": 1, "totalAttempts": 1},
                    {"name": "store", "state": {"kind": "started"}, "attempts": 2, "totalAttempts": 2},
                    {"name": "retired", "state": {"kind": "started"}}
                ]
            }))
            .unwrap(),
            TaskLike::from_value(json!({
                "name": "cleanup",
                "state": {"name": "Succeeded", "kind": "completed"},
                "attempts": 1,
                "totalAttempts": 1
            }))
            .unwrap(),
        ];

        let tasks = factory().reincarnate_tasks(&[job.clone()], &priors, ReincarnateOptions::default());

        assert_eq!(tasks.len(), 2);
        let task = &tasks[0];
        assert!(task.definition().ptr_eq(&job));
        assert!(task.unstarted());
        assert_eq!(task.attempts(), 2);
        assert_eq!(task.total_attempts(), 3);
        assert!(task.sub_task("fetch").unwrap().completed());
        assert!(task.sub_task("store").unwrap().unstarted());
        assert!(task.sub_task("retired").is_none());

        let history = &tasks[1];
        assert_eq!(history.name(), "cleanup");
        assert!(history.is_unusable());
        assert_eq!(history.state(), TaskState::SUCCEEDED);
    }

    #[test]
    fn test_reincarnation_can_revert_attempts() {
        let job = managed("job");
        let prior = TaskLike::from_value(json!({
            "name": "job",
            "state": {"kind": "timedOut"},
            "attempts": 2,
            "totalAttempts": 4
        }))
        .unwrap();

        let tasks = factory().reincarnate_tasks(
            &[job],
            &[prior],
            ReincarnateOptions {
                revert_attempts: true,
            },
        );

        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].unstarted());
        assert_eq!(tasks[0].attempts(), 0);
        assert_eq!(tasks[0].total_attempts(), 4);
        assert!(!tasks[0].is_unusable());
    }
}
