use bramble_devmgr::DevMgrServer;
use bramble_proto::wire::Message;
use bramble_proto::*;
use bramble_rpc::spawn::MockSpawner;
use bramble_rpc::{Ctx, Envelope, Router, Service};

const DEVMGR: Pid = 2;
const DRIVER: Pid = 42;
const CLIENT: Pid = 1;
const WATCHER: Pid = 7;

fn devmgr() -> Router {
    let mut router = Router::new();
    router.register(
        DEVMGR,
        Box::new(DevMgrServer::new(DEVMGR, Box::new(MockSpawner::new(100)))),
    );
    router
}

fn add_request(path: &str, handler: Pid) -> Vec<u8> {
    AddRequest {
        path: path.into(),
        info: Stat::char_device(),
        handler,
        device_info: vec![0x10, 0x11],
    }
    .encode()
}

fn last_reply(router: &mut Router, pid: Pid) -> Vec<u8> {
    let mut mail = router.take_mailbox(pid);
    assert!(!mail.is_empty(), "no reply for pid {pid}");
    mail.pop().unwrap().1
}

#[test]
fn add_open_and_duplicate_add() {
    let mut router = devmgr();

    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/storage/sd0", DRIVER));
    let reply = AddResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(reply.status, AddStatus::Success);
    assert_eq!(reply.handler, DRIVER);

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsOpen,
        LookupRequest {
            path: "/dev/storage/sd0".into(),
        }
        .encode(),
    );
    let open = StatResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert!(open.success);
    assert_eq!(open.handler, DRIVER);
    assert!(open.info.is_char_device());

    // a second claim on the path names the standing owner
    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/storage/sd0", 99));
    let dup = AddResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(dup.status, AddStatus::AlreadyExist);
    assert_eq!(dup.handler, DRIVER);

    // and the registry still answers with the original owner
    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsStat,
        LookupRequest {
            path: "/dev/storage/sd0".into(),
        }
        .encode(),
    );
    let stat = StatResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(stat.handler, DRIVER);
}

#[test]
fn open_of_unknown_path_fails_cleanly() {
    let mut router = devmgr();
    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsOpen,
        LookupRequest {
            path: "/dev/nonexistent".into(),
        }
        .encode(),
    );
    let open = StatResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert!(!open.success);
}

#[test]
fn non_character_device_add_is_rejected() {
    let mut router = devmgr();
    let request = AddRequest {
        path: "/dev/storage/bad".into(),
        info: Stat::directory(),
        handler: DRIVER,
        device_info: Vec::new(),
    };
    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, request.encode());
    let reply = AddResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(reply.status, AddStatus::Error);
}

#[test]
fn watcher_gets_exactly_one_event_per_add() {
    let mut router = devmgr();

    router.request(
        WATCHER,
        DEVMGR,
        RpcCode::VfsWatchRegister,
        WatchRequest {
            target: "/dev/storage".into(),
            handler: WATCHER,
        }
        .encode(),
    );
    let reply = StatusResponse::decode(&last_reply(&mut router, WATCHER)).unwrap();
    assert_eq!(reply.status, 0);

    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/storage/mmc0", 8));
    let events: Vec<_> = router
        .take_mailbox(WATCHER)
        .into_iter()
        .filter(|(code, _)| *code == RpcCode::VfsWatchNotify)
        .collect();
    assert_eq!(events.len(), 1);
    let event = WatchNotify::decode(&events[0].1).unwrap();
    assert_eq!(event.path, "/dev/storage");

    // nobody else heard anything
    assert!(router.take_mailbox(CLIENT + 50).is_empty());

    // registering the same pair again is flagged, not destructive
    router.request(
        WATCHER,
        DEVMGR,
        RpcCode::VfsWatchRegister,
        WatchRequest {
            target: "/dev/storage".into(),
            handler: WATCHER,
        }
        .encode(),
    );
    let reply = StatusResponse::decode(&last_reply(&mut router, WATCHER)).unwrap();
    assert_eq!(reply.status, Errno::EEXIST.status());

    // still exactly one event per mutation afterwards
    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/storage/mmc1", 8));
    let events = router.take_mailbox(WATCHER);
    assert_eq!(events.len(), 1);
}

#[test]
fn released_watcher_hears_nothing_further() {
    let mut router = devmgr();
    router.request(
        WATCHER,
        DEVMGR,
        RpcCode::VfsWatchRegister,
        WatchRequest {
            target: "/dev/storage".into(),
            handler: WATCHER,
        }
        .encode(),
    );
    router.request(
        WATCHER,
        DEVMGR,
        RpcCode::VfsWatchRelease,
        WatchRequest {
            target: "/dev/storage".into(),
            handler: WATCHER,
        }
        .encode(),
    );
    router.take_mailbox(WATCHER);

    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/storage/sd1", 8));
    assert!(router.take_mailbox(WATCHER).is_empty());
}

/// Minimal driver answering forwarded reads with a recognizable
/// payload.
struct StubDriver;

impl Service for StubDriver {
    fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope) {
        match env.code {
            RpcCode::VfsRead => {
                let request = ReadRequest::decode(&env.data).unwrap();
                ctx.reply(
                    ReadResponse {
                        len: request.len as i64,
                        data: vec![0xAB; request.len as usize],
                    }
                    .encode(),
                );
            }
            RpcCode::VfsRemove => {
                ctx.reply(StatusResponse::ok().encode());
            }
            _ => ctx.reply(StatusResponse::error(Errno::ENOSYS).encode()),
        }
    }
}

#[test]
fn forwarded_read_relays_the_driver_reply() {
    let mut router = devmgr();
    router.register(DRIVER, Box::new(StubDriver));

    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/storage/sd0", DRIVER));
    router.take_mailbox(CLIENT);

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsRead,
        ReadRequest {
            path: "/dev/storage/sd0".into(),
            offset: 0,
            len: 16,
            shm_id: 0,
        }
        .encode(),
    );
    let mail = router.take_mailbox(CLIENT);
    assert_eq!(mail.len(), 1, "exactly one response per request");
    let response = ReadResponse::decode(&mail[0].1).unwrap();
    assert_eq!(response.len, 16);
    assert_eq!(response.data, vec![0xAB; 16]);
}

#[test]
fn read_of_unregistered_path_is_enoent() {
    let mut router = devmgr();
    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsRead,
        ReadRequest {
            path: "/dev/void".into(),
            offset: 0,
            len: 16,
            shm_id: 0,
        }
        .encode(),
    );
    let response = ReadResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(response.len, Errno::ENOENT.length());
}

#[test]
fn owner_death_mid_forward_surfaces_as_eio() {
    let mut router = devmgr();
    router.register(DRIVER, Box::new(StubDriver));
    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/storage/sd0", DRIVER));
    router.take_mailbox(CLIENT);

    // the owner is gone but its entry lingers by design
    router.kill(DRIVER);
    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsRead,
        ReadRequest {
            path: "/dev/storage/sd0".into(),
            offset: 0,
            len: 16,
            shm_id: 0,
        }
        .encode(),
    );
    let response = ReadResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(response.len, Errno::EIO.length());
}

#[test]
fn remove_applies_on_owner_confirmation_and_notifies() {
    let mut router = devmgr();
    router.register(DRIVER, Box::new(StubDriver));
    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/storage/sd0", DRIVER));
    router.request(
        WATCHER,
        DEVMGR,
        RpcCode::VfsWatchRegister,
        WatchRequest {
            target: "/dev/storage".into(),
            handler: WATCHER,
        }
        .encode(),
    );
    router.take_mailbox(CLIENT);
    router.take_mailbox(WATCHER);

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsRemove,
        LookupRequest {
            path: "/dev/storage/sd0".into(),
        }
        .encode(),
    );
    let reply = StatusResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(reply.status, 0);
    assert_eq!(router.take_mailbox(WATCHER).len(), 1);

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsOpen,
        LookupRequest {
            path: "/dev/storage/sd0".into(),
        }
        .encode(),
    );
    let open = StatResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert!(!open.success);
}

#[test]
fn dev_start_spawns_and_dev_kill_is_reserved() {
    let mut router = devmgr();

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::DevStart,
        DevStartRequest {
            path: "/bin/storaged".into(),
        }
        .encode(),
    );
    let started = DevStartResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(started.status, 0);
    assert_eq!(started.pid, 100);

    router.request(CLIENT, DEVMGR, RpcCode::DevKill, Vec::new());
    let killed = StatusResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(killed.status, Errno::EINVAL.status());
}

#[test]
fn builtin_namespace_is_registered_at_startup() {
    let server = DevMgrServer::new(DEVMGR, Box::new(MockSpawner::new(100)));
    let paths: Vec<_> = server.registry().paths().cloned().collect();
    assert!(paths.contains(&"/dev/manager".to_string()));
    assert!(paths.contains(&"/dev/manager/device".to_string()));
    assert!(paths.contains(&"/dev/storage".to_string()));
}

#[test]
fn forward_to_live_but_serviceless_owner_fails_back_with_eio() {
    let mut router = devmgr();
    // WATCHER is known to the transport (it has made requests) but
    // runs no service; a raise at it cannot be delivered
    router.request(
        WATCHER,
        DEVMGR,
        RpcCode::VfsWatchRegister,
        WatchRequest {
            target: "/dev".into(),
            handler: WATCHER,
        }
        .encode(),
    );
    router.take_mailbox(WATCHER);
    router.request(CLIENT, DEVMGR, RpcCode::VfsAdd, add_request("/dev/ghost", WATCHER));
    router.take_mailbox(CLIENT);

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsWrite,
        WriteRequest {
            path: "/dev/ghost".into(),
            offset: 0,
            shm_id: 0,
            data: vec![0u8; 4],
            len: 4,
        }
        .encode(),
    );
    let response = WriteResponse::decode(&last_reply(&mut router, CLIENT)).unwrap();
    assert_eq!(response.len, Errno::EIO.length());
}
