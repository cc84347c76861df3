//! Integration tests for the dispatch pipeline.
//!
//! Tests: import → validate → queue → dispatch → transport → webhook
//!
//! Verifies:
//! - A cold identity gets exactly one warm-up batch until it is drained
//! - Launchers drive the flows and stop cleanly on shutdown
//! - Webhooks feed statuses and compliance flags back into the store

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::mpsc;

    use warmsend_core::{
        EmailStatus, IdentityAttrs, IdentityFlag, Recipient, RecipientFlag, SendingIdentity,
        Template, TemplateFlag,
    };

    use crate::flows::{
        DispatchConfig, DispatchFlow, ImportOutcome, QueueConfig, QueueFlow, QueueOutcome,
        RecipientImport, ValidateFlow, import_recipient,
    };
    use crate::reconcile::Reconciler;
    use crate::store::{DataStore, InMemoryStore};
    use crate::transport::{RecordingTransport, SendPool};
    use crate::validation::AcceptAllValidator;
    use crate::workers::{ChannelConfig, ChannelWorker, FlowLauncher, LaunchConfig, RunContext, Shutdown};

    async fn warmup_world(store: &InMemoryStore) -> (SendingIdentity, Template, Vec<Recipient>) {
        let identity = SendingIdentity::new(
            IdentityAttrs {
                api_token: "SG.key".into(),
                from_email: "hello@sender.test".into(),
                category: "warmup".into(),
                ..IdentityAttrs::default()
            },
            Utc::now(),
        );
        store.insert_identity(&identity).await.unwrap();

        let mut template = Template::new("Hello", "Plain hello {{ email }}", "<p>hello</p>", Utc::now());
        template.flags.insert(TemplateFlag::Warmup);
        store.insert_template(&template).await.unwrap();

        let mut recipients = Vec::new();
        for i in 0..5 {
            let created = Utc::now() + chrono::Duration::milliseconds(i);
            let mut r = Recipient::new(format!("seed{i}@example.com"), true, created);
            r.validated_at = Some(created);
            store.insert_recipient(&r).await.unwrap();
            recipients.push(r);
        }
        (identity, template, recipients)
    }

    #[tokio::test]
    async fn cold_identity_gets_one_warmup_batch() {
        let store = InMemoryStore::arc();
        let (identity, template, recipients) = warmup_world(&store).await;
        let flow = QueueFlow::new(store.clone(), QueueConfig::default());
        let ctx = RunContext::detached("queue", Duration::from_secs(50));

        flow.run(&ctx).await.unwrap();

        let stored = store.identity(identity.id).await.unwrap();
        assert!(stored.flags.contains(IdentityFlag::TextWarm));

        let emails = store.emails();
        assert_eq!(emails.len(), 30);
        assert!(emails.iter().all(|e| e.template_id == template.id && e.status.is_none()));
        for r in &recipients {
            assert_eq!(emails.iter().filter(|e| e.recipient_id == r.id).count(), 6);
        }
        for pair in emails.windows(2) {
            assert!(pair[1].target_at > pair[0].target_at);
        }

        flow.run(&ctx).await.unwrap();
        assert_eq!(store.emails().len(), 30);
        assert_eq!(
            flow.queue_identity(&stored, Utc::now()).await.unwrap(),
            QueueOutcome::AlreadyQueued { pending: 30 }
        );
        assert_eq!(store.identity(identity.id).await.unwrap().flags, stored.flags);
    }

    #[tokio::test(start_paused = true)]
    async fn launchers_queue_and_dispatch_until_shutdown() {
        let store = InMemoryStore::arc();
        let (_identity, _template, recipients) = warmup_world(&store).await;
        let transport = Arc::new(RecordingTransport::new());
        let pool = SendPool::new(transport.clone(), 4, Duration::from_secs(60));
        let shutdown = Shutdown::new();

        let queue = Arc::new(QueueFlow::new(store.clone(), QueueConfig::default()));
        let queue_handle = FlowLauncher::spawn(
            LaunchConfig::new("queue", Duration::from_secs(60), Duration::from_secs(50)),
            &shutdown,
            move |ctx| {
                let queue = Arc::clone(&queue);
                async move { queue.run(&ctx).await }
            },
        );

        let dispatch = Arc::new(DispatchFlow::new(store.clone(), pool.clone(), DispatchConfig::default()));
        let dispatch_handle = FlowLauncher::spawn(
            LaunchConfig::new("dispatch", Duration::from_secs(5), Duration::from_secs(50)),
            &shutdown,
            move |ctx| {
                let dispatch = Arc::clone(&dispatch);
                async move { dispatch.run(&ctx).await }
            },
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        shutdown.trigger();
        let queue_stats = queue_handle.join().await;
        let dispatch_stats = dispatch_handle.join().await;
        pool.drain().await;

        assert!(queue_stats.runs >= 1);
        assert_eq!(queue_stats.failures, 0);
        assert_eq!(dispatch_stats.failures + dispatch_stats.panics, 0);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, recipients[0].email);
        assert_eq!(sent[0].text, format!("Plain hello {}", recipients[0].email));
        assert!(sent[0].html.is_none());
        assert_eq!(sent[0].category, "warmup");

        let emails = store.emails();
        assert_eq!(emails.iter().filter(|e| e.is_sent()).count(), 1);
        assert_eq!(emails[0].status, Some(EmailStatus::Processed));
    }

    #[tokio::test]
    async fn webhooks_update_sent_email_and_recipient_standing() {
        let store = InMemoryStore::arc();
        let (_identity, _template, recipients) = warmup_world(&store).await;
        let transport = Arc::new(RecordingTransport::new());
        let pool = SendPool::new(transport.clone(), 1, Duration::from_secs(5));

        QueueFlow::new(store.clone(), QueueConfig::default())
            .run(&RunContext::detached("queue", Duration::from_secs(50)))
            .await
            .unwrap();
        DispatchFlow::new(store.clone(), pool.clone(), DispatchConfig::default())
            .dispatch_next()
            .await
            .unwrap();
        pool.drain().await;

        let target = &recipients[0];
        let reconciler = Reconciler::new(store.clone());
        let report = reconciler
            .apply_batch(&[
                json!({"email": target.email, "event": "delivered", "sg_message_id": "sg-1.filter", "sg_event_id": "e1"}),
                json!({"email": target.email, "event": "open", "sg_message_id": "sg-1.filter", "sg_event_id": "e2"}),
                json!({"email": target.email, "event": "processed", "sg_message_id": "sg-1.filter", "sg_event_id": "e3"}),
                json!({"email": target.email, "event": "unsubscribe", "sg_message_id": "sg-1.filter", "sg_event_id": "e4"}),
            ])
            .await;
        assert_eq!(report.processed, 4);
        assert_eq!(report.failed, 0);

        let email = store.email_by_message_id("sg-1.filter").await.unwrap().unwrap();
        assert_eq!(email.recipient_id, target.id);
        assert_eq!(email.status, Some(EmailStatus::Unsubscribe));

        let standing = store.recipient(target.id).await.unwrap();
        assert!(standing.flags.contains_all(
            [RecipientFlag::Delivered, RecipientFlag::Open, RecipientFlag::Unsubscribe]
                .into_iter()
                .collect()
        ));
        assert!(standing.is_disabled());

        let warm = store.recipients_with_flags(RecipientFlag::Warmup.into()).await.unwrap();
        assert_eq!(warm.len(), 4);
        assert!(warm.iter().all(|r| r.id != target.id));
    }

    #[tokio::test(start_paused = true)]
    async fn imported_recipients_become_volume_audience() {
        let store = InMemoryStore::arc();
        let (tx, rx) = mpsc::channel::<RecipientImport>(16);

        let import_store = store.clone();
        let worker = ChannelWorker::spawn(ChannelConfig::new("import"), rx, move |item, _ctx| {
            let store = import_store.clone();
            async move { import_recipient(&store, &item).await.map(|_| ()) }
        });
        for email in ["a@example.com", "b@example.com", "A@example.com", "not-an-address"] {
            tx.send(RecipientImport {
                email: email.into(),
                warmup: false,
            })
            .await
            .unwrap();
        }
        drop(tx);
        let stats = worker.await.unwrap();
        assert_eq!(stats.runs, 4);
        assert_eq!(stats.failures, 0);
        assert_eq!(
            import_recipient(&store, &RecipientImport { email: "b@example.com".into(), warmup: false })
                .await
                .unwrap(),
            ImportOutcome::Duplicate
        );

        let validate = ValidateFlow::new(store.clone(), AcceptAllValidator);
        for _ in 0..3 {
            validate.validate_next().await.unwrap();
        }

        let mut identity = SendingIdentity::new(IdentityAttrs::default(), Utc::now());
        identity.flags = [IdentityFlag::TextWarm, IdentityFlag::HtmlWarm].into_iter().collect();
        store.insert_identity(&identity).await.unwrap();
        store
            .insert_template(&Template::new("News", "Body", "", Utc::now()))
            .await
            .unwrap();

        let outcome = QueueFlow::new(store.clone(), QueueConfig::default())
            .queue_identity(&identity, Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, QueueOutcome::Volume { scheduled: 2, .. }));
    }
}
