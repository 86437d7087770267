use bramble_proto::RpcCode;
use bramble_rpc::{Ctx, Envelope, PendingMap, Router, Service};

/// Echoes request bytes back, uppercased, so forwarding is observable.
struct Echo;

impl Service for Echo {
    fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope) {
        let mut data = env.data;
        data.iter_mut().for_each(|b| *b = b.to_ascii_uppercase());
        ctx.reply(data);
    }
}

/// Forwards every request to a fixed target and relays the reply, the
/// same raise/completion dance the namespace server performs.
struct Forwarder {
    target: i32,
    pending: PendingMap<Vec<u8>>,
    failures: usize,
}

impl Service for Forwarder {
    fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope) {
        if let Some(completion) = env.completion {
            let original = self
                .pending
                .pop(completion.correlator)
                .expect("completion without continuation");
            if completion.failed {
                self.failures += 1;
                ctx.reply(b"fail".to_vec());
            } else {
                let mut relayed = original;
                relayed.extend_from_slice(&env.data);
                ctx.reply(relayed);
            }
            return;
        }
        match ctx.raise(self.target, env.code, env.data.clone()) {
            Ok(correlator) => self.pending.insert(correlator, env.data),
            Err(_) => ctx.reply(b"fail".to_vec()),
        }
    }
}

#[test]
fn forwarded_request_produces_exactly_one_reply() {
    let mut router = Router::new();
    router.register(10, Box::new(Echo));
    router.register(
        20,
        Box::new(Forwarder {
            target: 10,
            pending: PendingMap::new(),
            failures: 0,
        }),
    );

    router.request(1, 20, RpcCode::VfsRead, b"abc".to_vec());
    let replies = router.take_mailbox(1);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, RpcCode::VfsRead);
    assert_eq!(replies[0].1, b"abcABC");
}

#[test]
fn raise_to_dead_target_fails_back_as_completion() {
    let mut router = Router::new();
    router.register(10, Box::new(Echo));
    router.register(
        20,
        Box::new(Forwarder {
            target: 10,
            pending: PendingMap::new(),
            failures: 0,
        }),
    );
    router.kill(10);

    router.request(1, 20, RpcCode::VfsWrite, b"xyz".to_vec());
    let replies = router.take_mailbox(1);
    assert_eq!(replies, vec![(RpcCode::VfsWrite, b"fail".to_vec())]);
}

#[test]
fn notify_lands_in_plain_pid_mailbox() {
    struct Notifier;
    impl Service for Notifier {
        fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope) {
            if env.code == RpcCode::VfsAdd {
                ctx.notify(7, RpcCode::VfsWatchNotify, env.data.clone());
            }
            ctx.reply(Vec::new());
        }
    }

    let mut router = Router::new();
    router.register(30, Box::new(Notifier));
    // pid 7 becomes known to the transport by talking to it once
    router.request(7, 30, RpcCode::VfsWatchRegister, Vec::new());
    router.request(1, 30, RpcCode::VfsAdd, b"/dev/storage".to_vec());

    let mut seen = router.take_mailbox(7);
    // first entry is pid 7's own request reply
    assert_eq!(seen.remove(0).0, RpcCode::VfsWatchRegister);
    assert_eq!(
        seen,
        vec![(RpcCode::VfsWatchNotify, b"/dev/storage".to_vec())]
    );
}

#[test]
fn notify_to_dead_pid_is_silent() {
    struct Notifier;
    impl Service for Notifier {
        fn handle(&mut self, ctx: &mut Ctx<'_>, _env: Envelope) {
            ctx.notify(99, RpcCode::VfsWatchNotify, Vec::new());
            ctx.reply(Vec::new());
        }
    }

    let mut router = Router::new();
    router.register(30, Box::new(Notifier));
    router.request(1, 30, RpcCode::VfsAdd, Vec::new());
    assert_eq!(router.take_mailbox(1).len(), 1);
    assert!(router.take_mailbox(99).is_empty());
}

#[test]
fn requests_from_one_origin_stay_fifo() {
    struct Recorder {
        seen: Vec<u8>,
    }
    impl Service for Recorder {
        fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope) {
            self.seen.extend_from_slice(&env.data);
            ctx.reply(self.seen.clone());
        }
    }

    let mut router = Router::new();
    router.register(40, Box::new(Recorder { seen: Vec::new() }));
    for b in 0..5u8 {
        router.request(1, 40, RpcCode::VfsWrite, vec![b]);
    }
    let replies = router.take_mailbox(1);
    assert_eq!(replies.last().unwrap().1, vec![0, 1, 2, 3, 4]);
}
