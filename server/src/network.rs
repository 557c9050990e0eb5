//! Server network layer: UDP transport, event routing, and the main loop.
//!
//! All session mutation happens here, on the single task running
//! [`Server::run`]. A receiver task turns datagrams into [`ServerMessage`]s,
//! timer tasks feed their fires into the same channel, and a sender task
//! drains the outbound [`GameMessage`] queue. No two handlers for the same
//! session ever interleave, so the registry needs no locking.

use crate::connections::{Binding, ConnectionTable};
use crate::leaderboard;
use crate::registry::{normalize_code, QuizLookup, SessionRegistry};
use crate::scheduler::{self, QuestionPhase};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, SESSION_GRACE_SECS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Messages processed by the main server loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    /// A question countdown elapsed. Carries the question index so a stale
    /// fire can be recognized and dropped.
    QuestionDeadline {
        code: String,
        index: usize,
    },
    /// The grace window after a session ended elapsed.
    SessionExpired {
        code: String,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the outbound network task.
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

enum AdvanceOutcome {
    NextQuestion,
    Finished,
    Ignored,
}

/// The live session orchestrator and its transport.
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: ConnectionTable,
    registry: SessionRegistry,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        store: Arc<dyn QuizLookup>,
        connection_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: ConnectionTable::new(connection_timeout),
            registry: SessionRegistry::new(store),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, addrs } => {
                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Queues a packet for every connection in a session's room.
    async fn broadcast_packet(&self, packet: &Packet, addrs: Vec<SocketAddr>) {
        if addrs.is_empty() {
            return;
        }
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket {
            packet: packet.clone(),
            addrs,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Routes one inbound event to the session logic.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        // Any packet from a bound connection counts as liveness
        self.connections.refresh(&addr);

        match packet {
            Packet::JoinSession { code, name } => self.on_join(addr, code, name).await,
            Packet::HostSession { code } => self.on_host(addr, code).await,
            Packet::GetPlayerList { code } => self.on_player_list(addr, code).await,
            Packet::SubmitAnswer {
                answer,
                time_remaining,
            } => self.on_submit(addr, answer, time_remaining).await,
            Packet::AdminStart { code } => self.on_admin_start(addr, code).await,
            Packet::AdminAdvance { code } => self.on_admin_advance(addr, code).await,
            Packet::AdminEnd { code } => self.on_admin_end(addr, code).await,
            Packet::LeaveSession => self.on_disconnect(addr).await,
            Packet::Heartbeat { .. } => {}
            _ => {
                warn!("Unexpected server-bound packet type from {}", addr);
            }
        }
    }

    /// Admits a player into a session, lazily creating it from the authoring
    /// store when the code is cold.
    async fn on_join(&mut self, addr: SocketAddr, code: String, name: String) {
        let code = normalize_code(&code);
        debug!("Join request for {} from {} ({})", code, addr, name);

        let reply = match self.registry.get_or_load(&code).await {
            Err(e) => Err(e.to_string()),
            Ok(session) => match session.join(name.clone(), addr) {
                Err(e) => Err(e.to_string()),
                Ok(_) => Ok((
                    session.quiz().meta(),
                    session.player_count(),
                    leaderboard::project(session.players()),
                    leaderboard::roster_snapshot(session.players()),
                )),
            },
        };

        match reply {
            Err(message) => {
                self.send_packet(&Packet::SessionError { message }, addr)
                    .await;
            }
            Ok((quiz, total_players, entries, roster)) => {
                self.connections
                    .bind(addr, code.clone(), Some(name.clone()));
                self.send_packet(
                    &Packet::JoinedSession {
                        quiz,
                        player_id: addr.to_string(),
                    },
                    addr,
                )
                .await;

                let room = self.connections.addrs_in(&code);
                self.broadcast_packet(
                    &Packet::PlayerJoined {
                        name,
                        total_players,
                    },
                    room.clone(),
                )
                .await;
                self.broadcast_packet(&Packet::LeaderboardUpdate { entries }, room.clone())
                    .await;
                self.broadcast_packet(&Packet::PlayerList { players: roster }, room)
                    .await;
            }
        }
    }

    /// The admin control-plane entry: creates the session with the sender as
    /// admin, or claims an admin-less one. An existing admin is never
    /// displaced.
    async fn on_host(&mut self, addr: SocketAddr, code: String) {
        let code = normalize_code(&code);

        let reply = if let Some(session) = self.registry.get(&code) {
            if session.claim_admin(addr) {
                Ok(session.quiz().meta())
            } else {
                Err("Session already has a host".to_string())
            }
        } else {
            match self.registry.load_quiz(&code).await {
                Err(e) => Err(e.to_string()),
                Ok(quiz) => Ok(self.registry.create(quiz, addr, &code).quiz().meta()),
            }
        };

        match reply {
            Err(message) => {
                self.send_packet(&Packet::SessionError { message }, addr)
                    .await;
            }
            Ok(quiz) => {
                self.connections.bind(addr, code.clone(), None);
                self.send_packet(&Packet::SessionHosted { code, quiz }, addr)
                    .await;
            }
        }
    }

    /// Read-only roster snapshot, sent to the requester only.
    async fn on_player_list(&mut self, addr: SocketAddr, code: String) {
        let players = self
            .registry
            .get(&code)
            .map(|session| leaderboard::roster_snapshot(session.players()));

        if let Some(players) = players {
            self.send_packet(&Packet::PlayerList { players }, addr)
                .await;
        }
    }

    /// Scores and records a submission. Every failure mode here is a silent
    /// drop: answers for closed sessions, unknown senders, and re-submissions
    /// simply disappear.
    async fn on_submit(&mut self, addr: SocketAddr, answer: usize, time_remaining: f32) {
        let Some(binding) = self.connections.get(&addr) else {
            return;
        };
        let code = binding.code.clone();

        let scored = match self.registry.get(&code) {
            Some(session) if session.is_active() => {
                let correct = session.current_question().map(|(_, q)| q.correct_option);
                match (session.record_answer(addr, answer, time_remaining), correct) {
                    (Some(record), Some(correct_option)) => Some((
                        record,
                        correct_option,
                        leaderboard::project(session.players()),
                    )),
                    _ => None,
                }
            }
            _ => None,
        };

        let Some((record, correct_option, entries)) = scored else {
            debug!("Dropping submission from {} for {}", addr, code);
            return;
        };

        self.send_packet(
            &Packet::AnswerResult {
                is_correct: record.is_correct,
                points: record.points,
                correct_option,
            },
            addr,
        )
        .await;

        let room = self.connections.addrs_in(&code);
        self.broadcast_packet(&Packet::LeaderboardUpdate { entries }, room)
            .await;
    }

    /// Starts the quiz. Only the admin identity may do this, and only on an
    /// inactive session; anything else is silently ignored.
    async fn on_admin_start(&mut self, addr: SocketAddr, code: String) {
        let code = normalize_code(&code);

        let started = match self.registry.get(&code) {
            Some(session) if session.is_admin(addr) && !session.is_active() => {
                session.begin();
                true
            }
            Some(_) => {
                debug!("Ignoring start for {} from {}", code, addr);
                false
            }
            None => false,
        };

        if started {
            self.open_current_question(&code).await;
        }
    }

    /// Moves to the next question or finalizes when the quiz is exhausted.
    async fn on_admin_advance(&mut self, addr: SocketAddr, code: String) {
        let code = normalize_code(&code);

        let outcome = match self.registry.get(&code) {
            Some(session) if session.is_admin(addr) && session.is_active() => {
                match session.advance() {
                    Some(_) => AdvanceOutcome::NextQuestion,
                    None => AdvanceOutcome::Finished,
                }
            }
            Some(_) => {
                debug!("Ignoring advance for {} from {}", code, addr);
                AdvanceOutcome::Ignored
            }
            None => AdvanceOutcome::Ignored,
        };

        match outcome {
            AdvanceOutcome::NextQuestion => self.open_current_question(&code).await,
            AdvanceOutcome::Finished => self.finalize_session(&code).await,
            AdvanceOutcome::Ignored => {}
        }
    }

    /// Ends the session early. Admin-gated like start and advance.
    async fn on_admin_end(&mut self, addr: SocketAddr, code: String) {
        let code = normalize_code(&code);

        let allowed = match self.registry.get(&code) {
            Some(session) => session.is_admin(addr) && session.is_active(),
            None => false,
        };

        if allowed {
            self.finalize_session(&code).await;
        } else {
            debug!("Ignoring end for {} from {}", code, addr);
        }
    }

    /// Broadcasts the current question and arms its countdown. Installing the
    /// new deadline through the session's setter cancels any prior one.
    async fn open_current_question(&mut self, code: &str) {
        let Some(session) = self.registry.get(code) else {
            return;
        };
        let total = session.quiz().questions.len();
        let Some((index, question)) = session.current_question().map(|(i, q)| (i, q.clone()))
        else {
            return;
        };

        let time_limit_secs = question.time_limit();
        session.open_question();
        let handle = scheduler::arm_question_deadline(
            self.server_tx.clone(),
            code.to_string(),
            index,
            time_limit_secs,
        );
        session.set_deadline(handle);

        let packet = Packet::QuestionStart {
            index,
            total,
            prompt: question.prompt,
            options: question.options,
            points: question.points,
            time_limit_secs,
        };

        let room = self.connections.addrs_in(code);
        self.broadcast_packet(&packet, room).await;
    }

    /// A question countdown elapsed. Reveals the correct option unless the
    /// session has already moved past this question (a cancelled deadline
    /// that slipped through, or a session that ended meanwhile).
    async fn handle_question_deadline(&mut self, code: String, index: usize) {
        let reveal = match self.registry.get(&code) {
            Some(session)
                if session.is_active()
                    && session.phase() == QuestionPhase::Open
                    && session.current_index() == Some(index) =>
            {
                let correct = session.current_question().map(|(_, q)| q.correct_option);
                session.close_question();
                correct.map(|correct_option| Packet::QuestionEnd {
                    index,
                    correct_option,
                })
            }
            _ => {
                debug!("Ignoring stale deadline for {} question {}", code, index);
                None
            }
        };

        if let Some(packet) = reveal {
            let room = self.connections.addrs_in(&code);
            self.broadcast_packet(&packet, room).await;
        }
    }

    /// Ends a session: final ranked leaderboard to the room, then removal
    /// from the registry after the grace window.
    async fn finalize_session(&mut self, code: &str) {
        let payload = {
            let Some(session) = self.registry.get(code) else {
                return;
            };
            session.finalize();
            Packet::SessionEnded {
                final_leaderboard: leaderboard::project_final(session.players()),
                total_questions: session.quiz().questions.len(),
            }
        };

        let room = self.connections.addrs_in(code);
        self.broadcast_packet(&payload, room).await;
        scheduler::schedule_expiry(self.server_tx.clone(), code.to_string(), SESSION_GRACE_SECS);
    }

    /// The grace window elapsed; the session leaves the registry for good.
    /// No-op if it was already removed.
    fn handle_session_expired(&mut self, code: String) {
        if let Some(session) = self.registry.remove(&code) {
            info!(
                "Session {} removed after grace window ({} players at end)",
                code,
                session.player_count()
            );
            self.connections.unbind_session(&code);
        }
    }

    /// Explicit leave. Timeouts funnel into [`Self::drop_connection`] too.
    async fn on_disconnect(&mut self, addr: SocketAddr) {
        let Some(binding) = self.connections.unbind(&addr) else {
            return;
        };
        info!("Connection {} left session {}", addr, binding.code);
        self.drop_connection(addr, binding).await;
    }

    /// Removes a departed connection's player from its roster and tells the
    /// room. Admin connections have no roster entry; their session carries on.
    async fn drop_connection(&mut self, addr: SocketAddr, binding: Binding) {
        let entries = match self.registry.get(&binding.code) {
            Some(session) => {
                if session.remove_player(addr).is_some() {
                    Some(leaderboard::project(session.players()))
                } else {
                    None
                }
            }
            None => None,
        };

        if let Some(entries) = entries {
            let room = self.connections.addrs_in(&binding.code);
            self.broadcast_packet(&Packet::LeaderboardUpdate { entries }, room)
                .await;
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;

        let mut sweep = interval(Duration::from_secs(1));

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::QuestionDeadline { code, index }) => {
                            self.handle_question_deadline(code, index).await;
                        },
                        Some(ServerMessage::SessionExpired { code }) => {
                            self.handle_session_expired(code);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!(
                                "Server shutting down; draining {} live sessions",
                                self.registry.len()
                            );
                            for code in self.registry.codes() {
                                info!("Session {} still registered at shutdown", code);
                            }
                            break;
                        }
                    }
                },

                // Connections that went silent are treated as disconnects
                _ = sweep.tick() => {
                    let expired = self.connections.check_timeouts();
                    for (addr, binding) in expired {
                        self.drop_connection(addr, binding).await;
                    }
                },
            }
        }

        Ok(())
    }
}
