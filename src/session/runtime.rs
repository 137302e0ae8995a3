use tokio::sync::{mpsc, oneshot};

use super::{RoomSession, SessionSnapshot};
use crate::common::commands::Reply;
use crate::common::{
    ChatError, ChatResult, DeliveryStatus, Message, MessageId, ParticipantId, Presence, RoomId,
    SessionCommand, SessionEvent,
};
use crate::config::ChatConfig;
use crate::network::InboundSink;

const CHANNEL_CAPACITY: usize = 100;

/// Owns a [`RoomSession`] and serializes everything that touches it: commands
/// from any number of handles and the session's own timers.
pub struct SessionTask {
    session: RoomSession,
    command_receiver: mpsc::Receiver<SessionCommand>,
    event_sender: mpsc::Sender<SessionEvent>,
}

impl SessionTask {
    pub fn new(
        session: RoomSession,
        command_receiver: mpsc::Receiver<SessionCommand>,
        event_sender: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            session,
            command_receiver,
            event_sender,
        }
    }

    /// Spawn the task for an already built session and start connecting it.
    pub fn spawn(mut session: RoomSession) -> ChatResult<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
        session.connect()?;
        let (command_sender, command_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_sender, event_receiver) = mpsc::channel(CHANNEL_CAPACITY);

        let task = Self::new(session, command_receiver, event_sender);
        tokio::spawn(task.run());

        Ok((SessionHandle { command_sender }, event_receiver))
    }

    pub async fn run(mut self) {
        log::info!("Session {} event loop started", self.session.id());

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    let Some(command) = command else {
                        log::info!("All session handles dropped");
                        self.session.close();
                        self.flush_events();
                        break;
                    };
                    let keep_running = self.handle_command(command);
                    self.flush_events();
                    if !keep_running {
                        break;
                    }
                }
                (owner, event) = self.session.next_timer() => {
                    self.session.fire(owner, event);
                    self.flush_events();
                }
            }
        }

        log::info!("Session {} event loop stopped", self.session.id());
    }

    fn handle_command(&mut self, command: SessionCommand) -> bool {
        let session = &mut self.session;
        match command {
            SessionCommand::Send { content, reply } => respond(reply, session.send(&content)),
            SessionCommand::Resend { id, reply } => respond(reply, session.resend(id)),
            SessionCommand::SwitchRoom { room, reply } => respond(reply, session.switch_room(&room)),
            SessionCommand::StartTyping { reply } => respond(reply, session.start_typing()),
            SessionCommand::StopTyping { reply } => respond(reply, session.stop_typing()),
            SessionCommand::InjectInbound {
                room,
                author,
                content,
                reply,
            } => respond(reply, session.inject_inbound_message(&room, author, &content)),
            SessionCommand::TypingStart {
                room,
                participant,
                reply,
            } => respond(reply, session.notify_typing_start(&room, participant)),
            SessionCommand::TypingStop {
                room,
                participant,
                reply,
            } => respond(reply, session.notify_typing_stop(&room, participant)),
            SessionCommand::PresenceUpdate {
                participant,
                status,
                reply,
            } => respond(reply, session.notify_presence(participant, status)),
            SessionCommand::Acknowledge { id, status, reply } => {
                respond(reply, session.acknowledge(id, status))
            }
            SessionCommand::DeliveryFailed { id, reply } => {
                respond(reply, session.report_delivery_failure(id))
            }
            SessionCommand::StartSynthesizer { reply } => {
                respond(reply, session.start_synthesizer())
            }
            SessionCommand::StopSynthesizer { reply } => respond(reply, session.stop_synthesizer()),
            SessionCommand::Snapshot { reply } => respond(reply, Ok(session.snapshot())),
            SessionCommand::Shutdown { reply } => {
                session.close();
                respond(reply, Ok(()));
                return false;
            }
        }
        true
    }

    fn flush_events(&mut self) {
        for event in self.session.drain_events() {
            match self.event_sender.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    log::warn!("Event channel full; dropped {event:?}");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("Event receiver dropped");
                    return;
                }
            }
        }
    }
}

fn respond<T>(reply: Reply<T>, result: ChatResult<T>) {
    if reply.send(result).is_err() {
        log::debug!("Requester went away before the reply");
    }
}

/// Build a session from `config`, spawn its task and start connecting.
pub fn spawn_session(
    config: &ChatConfig,
) -> ChatResult<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
    SessionTask::spawn(RoomSession::new(config)?)
}

/// Cheap, cloneable front for a running session. Every call is answered once the
/// session task has applied it; after shutdown they all fail with
/// [`ChatError::SessionClosed`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    command_sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn send(&self, content: impl Into<String>) -> ChatResult<Message> {
        let content = content.into();
        self.request(|reply| SessionCommand::Send { content, reply })
            .await
    }

    pub async fn resend(&self, id: MessageId) -> ChatResult<Message> {
        self.request(|reply| SessionCommand::Resend { id, reply }).await
    }

    pub async fn switch_room(&self, room: impl Into<RoomId>) -> ChatResult<()> {
        let room = room.into();
        self.request(|reply| SessionCommand::SwitchRoom { room, reply })
            .await
    }

    pub async fn start_typing(&self) -> ChatResult<()> {
        self.request(|reply| SessionCommand::StartTyping { reply }).await
    }

    pub async fn stop_typing(&self) -> ChatResult<()> {
        self.request(|reply| SessionCommand::StopTyping { reply }).await
    }

    pub async fn inject_inbound(
        &self,
        room: impl Into<RoomId>,
        author: ParticipantId,
        content: impl Into<String>,
    ) -> ChatResult<Message> {
        let (room, content) = (room.into(), content.into());
        self.request(|reply| SessionCommand::InjectInbound {
            room,
            author,
            content,
            reply,
        })
        .await
    }

    pub async fn typing_start(&self, room: impl Into<RoomId>, participant: ParticipantId) -> ChatResult<()> {
        let room = room.into();
        self.request(|reply| SessionCommand::TypingStart {
            room,
            participant,
            reply,
        })
        .await
    }

    pub async fn typing_stop(&self, room: impl Into<RoomId>, participant: ParticipantId) -> ChatResult<()> {
        let room = room.into();
        self.request(|reply| SessionCommand::TypingStop {
            room,
            participant,
            reply,
        })
        .await
    }

    pub async fn set_presence(&self, participant: ParticipantId, status: Presence) -> ChatResult<()> {
        self.request(|reply| SessionCommand::PresenceUpdate {
            participant,
            status,
            reply,
        })
        .await
    }

    pub async fn acknowledge(&self, id: MessageId, status: DeliveryStatus) -> ChatResult<()> {
        self.request(|reply| SessionCommand::Acknowledge { id, status, reply })
            .await
    }

    pub async fn report_delivery_failure(&self, id: MessageId) -> ChatResult<()> {
        self.request(|reply| SessionCommand::DeliveryFailed { id, reply })
            .await
    }

    pub async fn start_synthesizer(&self) -> ChatResult<bool> {
        self.request(|reply| SessionCommand::StartSynthesizer { reply })
            .await
    }

    /// Resolves once no synthesizer timer is left in the session.
    pub async fn stop_synthesizer(&self) -> ChatResult<usize> {
        self.request(|reply| SessionCommand::StopSynthesizer { reply })
            .await
    }

    pub async fn snapshot(&self) -> ChatResult<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    pub async fn shutdown(&self) -> ChatResult<()> {
        self.request(|reply| SessionCommand::Shutdown { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> SessionCommand) -> ChatResult<T> {
        let (reply, response) = oneshot::channel();
        self.command_sender
            .send(build(reply))
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        response.await.map_err(|_| ChatError::SessionClosed)?
    }
}
