#[cfg(test)]
mod tests {
    use crate::context::PreExecutionContext;
    use crate::start_preexec_worker;
    use crate::tests::mock::{
        get_random_address, get_sample_collaborators, get_sample_value, StallScript, TestScript,
    };
    use calyx_models::account::{Account, ContractType};
    use calyx_models::transaction::Operation;
    use calyx_preexec_exports::{
        ContractHost, ContractTestParameter, PreExecutionConfig, PreExecutionError,
        PreProcessStatus, TestCallMode,
    };
    use calyx_time::CalyxTime;
    use serial_test::serial;
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// The completion callback fires just before the job moves to the
    /// completed map; observers polling the registry right after a callback
    /// wait out that hand-over.
    fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < timeout {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    #[serial]
    fn test_preexec_shutdown() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, _controller) =
            start_preexec_worker(PreExecutionConfig::default(), applier, runtime, store);
        manager.stop();
    }

    #[test]
    #[serial]
    fn test_async_then_sync_cache_hit() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, controller) = start_preexec_worker(
            PreExecutionConfig::default(),
            applier.clone(),
            runtime,
            store,
        );

        let value = get_sample_value(10, 2);
        let (result_tx, result_rx) = mpsc::channel();
        let status = controller
            .async_pre_process(
                &value,
                Box::new(move |result| {
                    let _ = result_tx.send(result);
                }),
            )
            .unwrap();
        assert_eq!(status, PreProcessStatus::Running);
        assert!(result_rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(wait_until(
            || controller.status().completed_size == 1,
            Duration::from_secs(1)
        ));

        // the commit path must serve the cached closing ledger without
        // running a second apply
        let ledger = controller.sync_process(&value).unwrap();
        assert_eq!(ledger.header.unwrap().seq, 10);
        assert_eq!(ledger.applied.len(), 2);
        assert_eq!(applier.apply_calls.load(Ordering::SeqCst), 1);

        let status = controller.status();
        assert_eq!(status.completed_size, 1);
        assert_eq!(status.running_size, 0);

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_async_cached_success_skips_callback() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, controller) =
            start_preexec_worker(PreExecutionConfig::default(), applier, runtime, store);

        let value = get_sample_value(11, 1);
        let (first_tx, first_rx) = mpsc::channel();
        controller
            .async_pre_process(
                &value,
                Box::new(move |result| {
                    let _ = first_tx.send(result);
                }),
            )
            .unwrap();
        assert!(first_rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(wait_until(
            || controller.status().completed_size == 1,
            Duration::from_secs(1)
        ));

        let (second_tx, second_rx) = mpsc::channel();
        let status = controller
            .async_pre_process(
                &value,
                Box::new(move |result| {
                    let _ = second_tx.send(result);
                }),
            )
            .unwrap();
        assert_eq!(status, PreProcessStatus::CachedSuccess);
        // the caller already knows the outcome: no callback
        assert!(second_rx.recv_timeout(Duration::from_millis(200)).is_err());

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_sync_pre_process_timeout_with_partial_progress() {
        let (applier, runtime, store) = get_sample_collaborators();
        let config = PreExecutionConfig {
            tx_timeout: CalyxTime::from_millis(300),
            ..PreExecutionConfig::default()
        };
        let (mut manager, controller) =
            start_preexec_worker(config, applier.clone(), runtime.clone(), store);

        // the second of three transactions never finishes on its own
        *applier.stall.lock() = Some(StallScript {
            tx_index: 1,
            contract_ids: vec![1],
        });

        let value = get_sample_value(12, 3);
        let started = Instant::now();
        let result = controller.sync_pre_process(&value, CalyxTime::from_millis(1_000));
        match result {
            Err(PreExecutionError::Timeout(timeout_tx_index)) => {
                assert_eq!(timeout_tx_index, 1)
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        // the wait is bounded by the caller budget plus polling slack
        assert!(started.elapsed() < Duration::from_millis(2_500));
        assert!(runtime.cancel_log.lock().contains(&1));
        assert_eq!(controller.status().running_size, 0);

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_cached_failure_reported_on_sync_entry() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, controller) =
            start_preexec_worker(PreExecutionConfig::default(), applier.clone(), runtime, store);

        applier.fail.store(true, Ordering::SeqCst);
        let value = get_sample_value(13, 1);
        // the first run completes in time, its failed outcome gets cached
        assert!(controller
            .sync_pre_process(&value, CalyxTime::from_millis(2_000))
            .is_ok());
        assert!(matches!(
            controller.sync_pre_process(&value, CalyxTime::from_millis(2_000)),
            Err(PreExecutionError::CachedFailure)
        ));
        assert_eq!(applier.apply_calls.load(Ordering::SeqCst), 1);

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_nested_cancellation_lifo() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, controller) =
            start_preexec_worker(PreExecutionConfig::default(), applier.clone(), runtime.clone(), store);

        *applier.test_script.lock() = Some(TestScript {
            nested_ids: vec![7, 8, 9],
            block: true,
        });

        let parameter = ContractTestParameter {
            contract_address: None,
            source_address: String::new(),
            code: "(module)".to_string(),
            input: "{}".to_string(),
            call_mode: TestCallMode::Execute,
        };
        let started = Instant::now();
        let result = controller.sync_test_process(
            ContractType::Wasm,
            parameter,
            CalyxTime::from_millis(500),
        );
        assert!(matches!(result, Err(PreExecutionError::Timeout(_))));
        // cancellation tears the invocations down innermost first
        assert_eq!(*runtime.cancel_log.lock(), vec![9, 8, 7]);
        assert!(started.elapsed() < Duration::from_millis(2_500));

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_synthetic_contract_account() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, controller) = start_preexec_worker(
            PreExecutionConfig::default(),
            applier.clone(),
            runtime,
            store.clone(),
        );

        // the source exists in the real store; only the contract account is
        // synthesized
        let source_address = get_random_address();
        store.insert_account(Account::new(source_address));

        let parameter = ContractTestParameter {
            contract_address: None,
            source_address: source_address.to_string(),
            code: "(module)".to_string(),
            input: "{\"method\":\"init\"}".to_string(),
            call_mode: TestCallMode::Execute,
        };
        let output = controller
            .sync_test_process(ContractType::Wasm, parameter, CalyxTime::from_millis(2_000))
            .unwrap();

        // receipts are enriched with the synthetic ledger placement
        assert_eq!(output.txs.len(), 1);
        assert_eq!(output.txs[0].ledger_seq, 5);
        assert_eq!(output.txs[0].close_time, CalyxTime::from_millis(1_000_001));
        assert_eq!(output.logs.len(), 1);
        assert_eq!(output.returns.len(), 1);

        // exactly one synthetic account, at the freshly derived destination,
        // carrying the code under test
        let environment = applier.seen_environment.lock().clone().unwrap();
        assert_eq!(environment.len(), 1);
        let dest_address = match &output.txs[0].transaction.operations[0] {
            Operation::Payment { dest_address, .. } => *dest_address,
            other => panic!("expected a payment, got {:?}", other),
        };
        assert_ne!(dest_address, source_address);
        let account = environment.account(&dest_address).unwrap();
        let contract = account.contract.as_ref().unwrap();
        assert_eq!(contract.payload, "(module)");
        assert_eq!(contract.contract_type, ContractType::Wasm);

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_contract_query_path() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, controller) =
            start_preexec_worker(PreExecutionConfig::default(), applier, runtime.clone(), store);

        let parameter = ContractTestParameter {
            contract_address: None,
            source_address: "not an address".to_string(),
            code: "(module)".to_string(),
            input: "{\"method\":\"balance\"}".to_string(),
            call_mode: TestCallMode::Query,
        };
        let output = controller
            .sync_test_process(ContractType::Wasm, parameter, CalyxTime::from_millis(2_000))
            .unwrap();

        assert_eq!(runtime.query_calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.returns, vec![serde_json::json!({ "balance": 42 })]);
        // queries apply no transaction
        assert!(output.txs.is_empty());

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_prune_completed() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, controller) =
            start_preexec_worker(PreExecutionConfig::default(), applier.clone(), runtime, store);

        let values: Vec<_> = [5u64, 7, 9]
            .iter()
            .map(|seq| get_sample_value(*seq, 1))
            .collect();
        for value in &values {
            assert!(controller
                .sync_pre_process(value, CalyxTime::from_millis(2_000))
                .is_ok());
        }
        assert_eq!(controller.status().completed_size, 3);

        controller.remove_completed(7);
        assert_eq!(controller.status().completed_size, 1);

        // the survivor is the seq-9 entry: probing it is a pure cache hit
        let apply_calls = applier.apply_calls.load(Ordering::SeqCst);
        assert!(controller
            .sync_pre_process(&values[2], CalyxTime::from_millis(2_000))
            .is_ok());
        assert_eq!(applier.apply_calls.load(Ordering::SeqCst), apply_calls);

        // pruning below an already-pruned bound is a no-op
        controller.remove_completed(5);
        assert_eq!(controller.status().completed_size, 1);
        controller.remove_completed(9);
        assert_eq!(controller.status().completed_size, 0);

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_identical_fingerprint_race() {
        let (applier, runtime, store) = get_sample_collaborators();
        let (mut manager, controller) =
            start_preexec_worker(PreExecutionConfig::default(), applier.clone(), runtime, store);

        applier
            .tx_sleeps
            .lock()
            .insert(0, Duration::from_millis(300));

        let value = get_sample_value(20, 1);
        let (first_tx, first_rx) = mpsc::channel();
        let (second_tx, second_rx) = mpsc::channel();
        let first = controller
            .async_pre_process(
                &value,
                Box::new(move |result| {
                    let _ = first_tx.send(result);
                }),
            )
            .unwrap();
        let second = controller
            .async_pre_process(
                &value,
                Box::new(move |result| {
                    let _ = second_tx.send(result);
                }),
            )
            .unwrap();
        assert_eq!(first, PreProcessStatus::Running);
        assert_eq!(second, PreProcessStatus::Running);

        assert!(first_rx.recv_timeout(Duration::from_secs(3)).unwrap());
        assert!(second_rx.recv_timeout(Duration::from_secs(3)).unwrap());

        // both workers ran, exactly one entry survives in the cache
        assert_eq!(applier.apply_calls.load(Ordering::SeqCst), 2);
        assert!(wait_until(
            || {
                let status = controller.status();
                status.completed_size == 1 && status.running_size == 0
            },
            Duration::from_secs(1)
        ));

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_sweeper_cancels_over_budget() {
        let (applier, runtime, store) = get_sample_collaborators();
        let config = PreExecutionConfig {
            global_budget: CalyxTime::from_millis(200),
            // keep the per-transaction budget out of the way
            tx_timeout: CalyxTime::from_millis(10_000),
            ..PreExecutionConfig::default()
        };
        let (mut manager, controller) =
            start_preexec_worker(config, applier.clone(), runtime.clone(), store);

        *applier.stall.lock() = Some(StallScript {
            tx_index: 0,
            contract_ids: vec![42],
        });

        let value = get_sample_value(21, 1);
        let (result_tx, result_rx) = mpsc::channel();
        controller
            .async_pre_process(
                &value,
                Box::new(move |result| {
                    let _ = result_tx.send(result);
                }),
            )
            .unwrap();

        // the sweeper cancels the job once it runs past the global budget
        assert!(!result_rx.recv_timeout(Duration::from_secs(3)).unwrap());
        assert!(runtime.cancel_log.lock().contains(&42));
        assert!(wait_until(
            || {
                let status = controller.status();
                status.running_size == 0 && status.completed_size == 1
            },
            Duration::from_secs(1)
        ));

        manager.stop();
    }

    #[test]
    #[serial]
    fn test_cancel_idempotent_and_stack_discipline() {
        let (applier, runtime, store) = get_sample_collaborators();

        // normal completion leaves the invocation stack empty
        let ctx = Arc::new(PreExecutionContext::new_test(
            ContractType::Wasm,
            ContractTestParameter {
                contract_address: None,
                source_address: String::new(),
                code: "(module)".to_string(),
                input: "{}".to_string(),
                call_mode: TestCallMode::Execute,
            },
            applier.clone(),
            runtime.clone(),
            store.clone(),
        ));
        ctx.run();
        assert!(ctx.top_contract_id().is_none());
        assert!(ctx.exe_result());

        // a blocked job survives repeated cancellation and ends up stopped
        *applier.test_script.lock() = Some(TestScript {
            nested_ids: vec![3, 4],
            block: true,
        });
        let ctx = Arc::new(PreExecutionContext::new_test(
            ContractType::Wasm,
            ContractTestParameter {
                contract_address: None,
                source_address: String::new(),
                code: "(module)".to_string(),
                input: "{}".to_string(),
                call_mode: TestCallMode::Execute,
            },
            applier,
            runtime.clone(),
            store,
        ));
        PreExecutionContext::start(&ctx, "test-contract").unwrap();
        std::thread::sleep(Duration::from_millis(100));
        ctx.cancel();
        assert!(!ctx.is_running());
        ctx.cancel();
        assert!(!ctx.is_running());
        // the first teardown walked the stacked invocations in reverse
        assert_eq!(runtime.cancel_log.lock()[..2], [4, 3]);
    }
}
