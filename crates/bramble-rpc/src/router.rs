use crate::{Completion, Correlator, Envelope, RpcError};
use bramble_proto::{Pid, RpcCode};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// A cooperative, single-threaded RPC endpoint.
pub trait Service {
    fn handle(&mut self, ctx: &mut Ctx<'_>, env: Envelope);
}

enum ReplyRoute {
    /// Plain client request; the reply lands in the client's mailbox
    /// under the request's code.
    Client { client: Pid, code: RpcCode },
    /// Forwarded request; the reply re-enters the raiser as a
    /// completion under this correlator and code.
    Raise {
        raiser: Pid,
        correlator: Correlator,
        code: RpcCode,
    },
    /// Fire-and-forget.
    None,
}

struct Delivery {
    to: Pid,
    env: Envelope,
    reply: ReplyRoute,
}

enum Action {
    Raise {
        target: Pid,
        code: RpcCode,
        payload: Vec<u8>,
        correlator: Correlator,
    },
    Notify {
        target: Pid,
        code: RpcCode,
        payload: Vec<u8>,
    },
}

/// Handler-side view of the runtime for the duration of one invocation.
pub struct Ctx<'a> {
    self_pid: Pid,
    live: &'a HashSet<Pid>,
    next_correlator: &'a mut Correlator,
    actions: Vec<Action>,
    reply: Option<Vec<u8>>,
}

impl Ctx<'_> {
    pub fn self_pid(&self) -> Pid {
        self.self_pid
    }

    /// The kernel vouches for origins on this transport; a non-positive
    /// pid is the only thing that can go wrong in-process.
    pub fn validate_origin(&self, origin: Pid) -> bool {
        origin > 0
    }

    /// Respond to the origin of the current invocation. One response
    /// per invocation; later calls win so error paths can overwrite an
    /// optimistic default, matching the replace-on-return transport.
    pub fn reply(&mut self, payload: Vec<u8>) {
        self.reply = Some(payload);
    }

    /// Forward the current request to another process. Does not block;
    /// the reply arrives later as a completion invocation carrying the
    /// returned correlator.
    pub fn raise(
        &mut self,
        target: Pid,
        code: RpcCode,
        payload: Vec<u8>,
    ) -> Result<Correlator, RpcError> {
        if !self.live.contains(&target) {
            return Err(RpcError::NoSuchProcess);
        }
        let correlator = *self.next_correlator;
        *self.next_correlator += 1;
        trace!(to = target, ?code, correlator, "raise");
        self.actions.push(Action::Raise {
            target,
            code,
            payload,
            correlator,
        });
        Ok(correlator)
    }

    /// Fire-and-forget send. Delivery failure to a dead target is
    /// deliberately silent.
    pub fn notify(&mut self, target: Pid, code: RpcCode, payload: Vec<u8>) {
        self.actions.push(Action::Notify {
            target,
            code,
            payload,
        });
    }
}

/// In-memory transport connecting services and plain client pids.
///
/// Deliveries are FIFO; handlers run to completion one at a time, which
/// is exactly the cooperative single-threaded model the real kernel
/// provides. Nothing here is `Send` on purpose.
pub struct Router {
    services: HashMap<Pid, Box<dyn Service>>,
    live: HashSet<Pid>,
    queue: VecDeque<Delivery>,
    mailboxes: HashMap<Pid, Vec<(RpcCode, Vec<u8>)>>,
    /// Reply routes parked while a request sits forwarded; keyed by
    /// the raise that suspended it.
    deferred: HashMap<Correlator, ReplyRoute>,
    next_correlator: Correlator,
}

impl Router {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            live: HashSet::new(),
            queue: VecDeque::new(),
            mailboxes: HashMap::new(),
            deferred: HashMap::new(),
            next_correlator: 1,
        }
    }

    pub fn register(&mut self, pid: Pid, service: Box<dyn Service>) {
        self.services.insert(pid, service);
        self.live.insert(pid);
    }

    /// Mark a process dead. In-flight raises to it will fail back to
    /// their raiser; notifications to it evaporate.
    pub fn kill(&mut self, pid: Pid) {
        debug!(pid, "kill");
        self.services.remove(&pid);
        self.live.remove(&pid);
    }

    /// Inject a client request and pump until the system settles.
    pub fn request(&mut self, client: Pid, target: Pid, code: RpcCode, data: Vec<u8>) {
        self.live.insert(client);
        self.queue.push_back(Delivery {
            to: target,
            env: Envelope {
                code,
                origin: client,
                data,
                completion: None,
            },
            reply: ReplyRoute::Client { client, code },
        });
        self.run_until_idle();
    }

    /// Drain everything delivered to a plain client pid: replies to its
    /// requests plus any fire-and-forget messages aimed at it.
    pub fn take_mailbox(&mut self, pid: Pid) -> Vec<(RpcCode, Vec<u8>)> {
        self.mailboxes.remove(&pid).unwrap_or_default()
    }

    pub fn run_until_idle(&mut self) {
        while let Some(delivery) = self.queue.pop_front() {
            self.deliver(delivery);
        }
    }

    fn deliver(&mut self, delivery: Delivery) {
        let Delivery { to, env, reply } = delivery;
        let Some(mut service) = self.services.remove(&to) else {
            self.undeliverable(to, env, reply);
            return;
        };
        let completion = env.completion;
        let mut ctx = Ctx {
            self_pid: to,
            live: &self.live,
            next_correlator: &mut self.next_correlator,
            actions: Vec::new(),
            reply: None,
        };
        service.handle(&mut ctx, env);
        let Ctx { actions, reply: produced, .. } = ctx;
        self.services.insert(to, service);

        let mut first_raise = None;
        for action in actions {
            match action {
                Action::Raise {
                    target,
                    code,
                    payload,
                    correlator,
                } => {
                    first_raise.get_or_insert(correlator);
                    self.queue.push_back(Delivery {
                        to: target,
                        env: Envelope {
                            code,
                            origin: to,
                            data: payload,
                            completion: None,
                        },
                        reply: ReplyRoute::Raise {
                            raiser: to,
                            correlator,
                            code,
                        },
                    });
                }
                Action::Notify {
                    target,
                    code,
                    payload,
                } => self.queue.push_back(Delivery {
                    to: target,
                    env: Envelope {
                        code,
                        origin: to,
                        data: payload,
                        completion: None,
                    },
                    reply: ReplyRoute::None,
                }),
            }
        }

        // a completion invocation answers the route parked when the
        // request was forwarded; a fresh invocation either answers its
        // own route now or parks it behind the raise it performed
        let route = match completion {
            Some(c) => self.deferred.remove(&c.correlator).unwrap_or(ReplyRoute::None),
            None => match (produced.is_some(), first_raise) {
                (false, Some(correlator)) => {
                    self.deferred.insert(correlator, reply);
                    ReplyRoute::None
                }
                _ => reply,
            },
        };
        if let Some(payload) = produced {
            self.route_reply(to, route, payload);
        }
    }

    /// The target is not a service: clients receive into a mailbox,
    /// raises fail back to their raiser, notifies evaporate.
    fn undeliverable(&mut self, to: Pid, env: Envelope, reply: ReplyRoute) {
        match reply {
            ReplyRoute::None if self.live.contains(&to) => {
                self.mailboxes
                    .entry(to)
                    .or_default()
                    .push((env.code, env.data));
            }
            ReplyRoute::None => {
                trace!(pid = to, "notify to dead pid dropped");
            }
            ReplyRoute::Raise {
                raiser,
                correlator,
                code,
            } => {
                debug!(pid = to, correlator, "raise target gone, failing back");
                self.queue.push_back(Delivery {
                    to: raiser,
                    env: Envelope {
                        code,
                        origin: to,
                        data: Vec::new(),
                        completion: Some(Completion {
                            correlator,
                            failed: true,
                        }),
                    },
                    reply: ReplyRoute::None,
                });
            }
            ReplyRoute::Client { client, .. } => {
                // request aimed at nothing; nothing to answer with
                trace!(pid = to, client, "request to dead pid dropped");
            }
        }
    }

    fn route_reply(&mut self, from: Pid, route: ReplyRoute, payload: Vec<u8>) {
        match route {
            ReplyRoute::Client { client, code } => {
                self.mailboxes.entry(client).or_default().push((code, payload));
            }
            ReplyRoute::Raise {
                raiser,
                correlator,
                code,
            } => self.queue.push_back(Delivery {
                to: raiser,
                env: Envelope {
                    code,
                    origin: from,
                    data: payload,
                    completion: Some(Completion {
                        correlator,
                        failed: false,
                    }),
                },
                reply: ReplyRoute::None,
            }),
            ReplyRoute::None => {}
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
