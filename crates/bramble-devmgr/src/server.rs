use crate::{parent_dir, DeviceEntry, IoctlTable, Registry, WatchTree};
use bramble_proto::wire::Message;
use bramble_proto::{
    AddRequest, AddResponse, AddStatus, DevStartRequest, DevStartResponse, Errno, IoctlRequest,
    IoctlResponse, LookupRequest, MountRequest, Pid, ProcessRequest, ReadRequest, ReadResponse,
    RpcCode, SeekRequest, SeekResponse, Stat, StatResponse, StatusResponse, UmountRequest,
    WatchNotify, WatchRequest, WriteRequest, WriteResponse,
};
use bramble_rpc::spawn::ProcessSpawner;
use bramble_rpc::{Ctx, Envelope, PendingMap, Service};
use tracing::{debug, info, warn};

/// A request parked between the raise to its owner and the owner's
/// reply. Exactly one response reaches the origin per continuation:
/// either the relayed driver reply or a synthesized error.
#[derive(Debug)]
struct Continuation {
    origin: Pid,
    code: RpcCode,
    /// Set for REMOVE: the namespace mutation applies once the owner
    /// confirms.
    remove_path: Option<String>,
}

pub struct DevMgrServer {
    self_pid: Pid,
    registry: Registry,
    watch: WatchTree,
    ioctl: IoctlTable,
    pending: PendingMap<Continuation>,
    spawner: Box<dyn ProcessSpawner>,
}

impl DevMgrServer {
    pub fn new(self_pid: Pid, spawner: Box<dyn ProcessSpawner>) -> Self {
        let mut server = Self {
            self_pid,
            registry: Registry::new(),
            watch: WatchTree::new(),
            ioctl: IoctlTable::new(),
            pending: PendingMap::new(),
            spawner,
        };
        server.register_builtin();
        server
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The management namespace the server itself provides.
    fn register_builtin(&mut self) {
        let commands = vec![RpcCode::DevStart as u32, RpcCode::DevKill as u32];
        for path in ["/dev/manager", "/dev/storage"] {
            let _ = self.registry.insert(DeviceEntry {
                path: path.to_string(),
                info: Stat::directory(),
                owner: self.self_pid,
                commands: commands.clone(),
            });
        }
        let _ = self.registry.insert(DeviceEntry {
            path: "/dev/manager/device".to_string(),
            info: Stat::char_device(),
            owner: self.self_pid,
            commands: commands.clone(),
        });
        for command in commands {
            self.ioctl.push(self.self_pid, command);
        }
    }

    fn handle_add(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let error = |status: AddStatus| AddResponse { status, handler: 0 };
        let Ok(request) = AddRequest::decode(&env.data) else {
            ctx.reply(error(AddStatus::Error).encode());
            return;
        };
        if !request.info.is_char_device() {
            ctx.reply(error(AddStatus::Error).encode());
            return;
        }
        // snapshot the parent's watchers before the namespace changes
        let watchers = parent_dir(&request.path)
            .map(|dir| (dir.to_string(), self.watch.subscribers(dir)));

        let entry = DeviceEntry {
            path: request.path.clone(),
            info: request.info,
            owner: request.handler,
            commands: request.device_info.clone(),
        };
        match self.registry.insert(entry) {
            Err(existing) => {
                ctx.reply(
                    AddResponse {
                        status: AddStatus::AlreadyExist,
                        handler: existing,
                    }
                    .encode(),
                );
                return;
            }
            Ok(()) => {}
        }
        for command in &request.device_info {
            self.ioctl.push(request.handler, *command);
        }
        info!(path = %request.path, handler = request.handler, "device added");

        // one event per subscriber; dead subscribers are the
        // transport's problem, not ours
        if let Some((dir, subscribers)) = watchers {
            let event = WatchNotify { path: dir }.encode();
            for subscriber in subscribers {
                ctx.notify(subscriber, RpcCode::VfsWatchNotify, event.clone());
            }
        }

        ctx.reply(
            AddResponse {
                status: AddStatus::Success,
                handler: request.handler,
            }
            .encode(),
        );
    }

    fn handle_lookup(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let Ok(request) = LookupRequest::decode(&env.data) else {
            ctx.reply(StatResponse::failure().encode());
            return;
        };
        let response = match self.registry.get(&request.path) {
            Some(entry) => StatResponse {
                success: true,
                handler: entry.owner,
                info: entry.info,
            },
            None => StatResponse::failure(),
        };
        ctx.reply(response.encode());
    }

    /// Error payload for a forwarded request that cannot proceed.
    fn forward_error(code: RpcCode, errno: Errno) -> Vec<u8> {
        match code {
            RpcCode::VfsRead => ReadResponse::error(errno).encode(),
            RpcCode::VfsWrite => WriteResponse {
                len: errno.length(),
            }
            .encode(),
            RpcCode::VfsSeek => SeekResponse {
                position: errno.length(),
            }
            .encode(),
            RpcCode::VfsIoctl => IoctlResponse::error(errno).encode(),
            _ => StatusResponse::error(errno).encode(),
        }
    }

    /// The path a forwarded request resolves through.
    fn forward_path(code: RpcCode, data: &[u8]) -> Option<String> {
        match code {
            RpcCode::VfsRead => ReadRequest::decode(data).ok().map(|r| r.path),
            RpcCode::VfsWrite => WriteRequest::decode(data).ok().map(|r| r.path),
            RpcCode::VfsSeek => SeekRequest::decode(data).ok().map(|r| r.path),
            RpcCode::VfsIoctl => IoctlRequest::decode(data).ok().map(|r| r.path),
            RpcCode::VfsMount => MountRequest::decode(data).ok().map(|r| r.source),
            RpcCode::VfsUmount => UmountRequest::decode(data).ok().map(|r| r.target),
            RpcCode::VfsRemove => LookupRequest::decode(data).ok().map(|r| r.path),
            _ => None,
        }
    }

    /// Look up the owner and re-raise the request at it, parking a
    /// continuation. The handler returns immediately; the reply goes
    /// out when the owner answers.
    fn handle_forward(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let Some(path) = Self::forward_path(env.code, &env.data) else {
            ctx.reply(Self::forward_error(env.code, Errno::EINVAL));
            return;
        };
        let removing = env.code == RpcCode::VfsRemove;
        let Some(owner) = self.registry.owner_of(&path) else {
            ctx.reply(Self::forward_error(env.code, Errno::ENOENT));
            return;
        };
        match ctx.raise(owner, env.code, env.data.clone()) {
            Ok(correlator) => {
                self.pending.insert(
                    correlator,
                    Continuation {
                        origin: env.origin,
                        code: env.code,
                        remove_path: removing.then(|| path.clone()),
                    },
                );
            }
            Err(_) => {
                warn!(%path, owner, "owner unreachable, failing forward");
                ctx.reply(Self::forward_error(env.code, Errno::EIO));
            }
        }
    }

    fn notify_removal(&mut self, ctx: &mut Ctx<'_>, path: &str) {
        if let Some(dir) = parent_dir(path) {
            let subscribers = self.watch.subscribers(dir);
            let event = WatchNotify {
                path: dir.to_string(),
            }
            .encode();
            for subscriber in subscribers {
                ctx.notify(subscriber, RpcCode::VfsWatchNotify, event.clone());
            }
        }
    }

    /// The async half: pair the owner's reply (or its death) with the
    /// parked continuation and relay.
    fn handle_completion(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let completion = match env.completion {
            Some(completion) => completion,
            None => return,
        };
        let Some(continuation) = self.pending.pop(completion.correlator) else {
            debug!(correlator = completion.correlator, "orphan completion");
            return;
        };
        if completion.failed {
            warn!(
                origin = continuation.origin,
                code = ?continuation.code,
                "owner died mid-forward"
            );
            ctx.reply(Self::forward_error(continuation.code, Errno::EIO));
            return;
        }
        // the namespace mutation a REMOVE carries applies on the
        // owner's confirmation
        if let Some(path) = continuation.remove_path {
            self.registry.remove(&path);
            self.notify_removal(ctx, &path);
        }
        // the driver's bytes go back verbatim
        ctx.reply(env.data.clone());
    }

    fn handle_watch_register(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let Ok(request) = WatchRequest::decode(&env.data) else {
            ctx.reply(StatusResponse::error(Errno::ENODATA).encode());
            return;
        };
        let response = match self.watch.register(&request.target, request.handler) {
            Ok(()) => StatusResponse::ok(),
            Err(errno) => StatusResponse::error(errno),
        };
        debug!(path = %request.target, handler = request.handler, "watch register");
        ctx.reply(response.encode());
    }

    fn handle_watch_release(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let Ok(request) = WatchRequest::decode(&env.data) else {
            ctx.reply(StatusResponse::error(Errno::ENODATA).encode());
            return;
        };
        self.watch.release(&request.target, request.handler);
        ctx.reply(StatusResponse::ok().encode());
    }

    /// Fire-and-forget: walk the subscriber set and emit one event per
    /// pid. No reply.
    fn handle_watch_notify(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let Ok(request) = WatchNotify::decode(&env.data) else {
            return;
        };
        let subscribers = self.watch.subscribers(&request.path);
        let event = env.data.clone();
        for subscriber in subscribers {
            ctx.notify(subscriber, RpcCode::VfsWatchNotify, event.clone());
        }
    }

    fn handle_process_exit(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let Ok(request) = ProcessRequest::decode(&env.data) else {
            ctx.reply(StatusResponse::error(Errno::EINVAL).encode());
            return;
        };
        // capabilities go; device entries deliberately stay (see the
        // registry notes)
        self.ioctl.drop_process(request.pid);
        ctx.reply(StatusResponse::ok().encode());
    }

    fn handle_dev_start(&mut self, ctx: &mut Ctx<'_>, env: &Envelope) {
        let Ok(request) = DevStartRequest::decode(&env.data) else {
            ctx.reply(
                DevStartResponse {
                    status: Errno::EINVAL.status(),
                    pid: 0,
                }
                .encode(),
            );
            return;
        };
        let response = match self.spawner.spawn(&request.path) {
            Ok(pid) => {
                info!(path = %request.path, pid, "daemon started");
                DevStartResponse { status: 0, pid }
            }
            Err(errno) => DevStartResponse {
                status: errno.status(),
                pid: 0,
            },
        };
        ctx.reply(response.encode());
    }
}

impl Service for DevMgrServer {
    fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope) {
        // the completion half of a forwarded request comes back
        // through the same handler entry point
        if env.is_completion() {
            self.handle_completion(ctx, &env);
            return;
        }
        if !ctx.validate_origin(env.origin) {
            ctx.reply(StatusResponse::error(Errno::EINVAL).encode());
            return;
        }
        match env.code {
            RpcCode::VfsAdd => self.handle_add(ctx, &env),
            RpcCode::VfsOpen | RpcCode::VfsStat => self.handle_lookup(ctx, &env),
            RpcCode::VfsRead
            | RpcCode::VfsWrite
            | RpcCode::VfsSeek
            | RpcCode::VfsIoctl
            | RpcCode::VfsMount
            | RpcCode::VfsUmount
            | RpcCode::VfsRemove => self.handle_forward(ctx, &env),
            RpcCode::VfsWatchRegister => self.handle_watch_register(ctx, &env),
            RpcCode::VfsWatchRelease => self.handle_watch_release(ctx, &env),
            RpcCode::VfsWatchNotify => self.handle_watch_notify(ctx, &env),
            RpcCode::VfsClose | RpcCode::VfsFork => {
                ctx.reply(StatusResponse::ok().encode());
            }
            RpcCode::VfsExit => self.handle_process_exit(ctx, &env),
            RpcCode::DevStart => self.handle_dev_start(ctx, &env),
            RpcCode::DevKill => {
                // reserved; semantics undefined upstream
                ctx.reply(StatusResponse::error(Errno::EINVAL).encode());
            }
            other => {
                debug!(?other, "unexpected code at the namespace server");
                ctx.reply(StatusResponse::error(Errno::ENOSYS).encode());
            }
        }
    }
}
