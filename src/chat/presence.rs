use crate::common::{ChatError, ChatResult, Participant, ParticipantId, Presence};

/// Last-write-wins view of every known participant's connection status.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    participants: Vec<Participant>,
}

impl PresenceRegistry {
    pub fn new(participants: impl IntoIterator<Item = Participant>) -> Self {
        let mut registry = Self::default();
        for participant in participants {
            if registry.get(participant.id).is_some() {
                log::warn!("Duplicate participant {} ignored", participant.id);
                continue;
            }
            registry.participants.push(participant);
        }
        registry
    }

    pub fn list(&self) -> &[Participant] {
        &self.participants
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Returns `true` when the stored status actually changed.
    pub fn set_status(&mut self, id: ParticipantId, status: Presence) -> ChatResult<bool> {
        let participant = self.get_mut(id)?;
        let changed = participant.status != status;
        participant.status = status;
        Ok(changed)
    }

    /// Change a participant's live display details. Messages already written keep
    /// the snapshot taken when they were created.
    pub fn update_profile(
        &mut self,
        id: ParticipantId,
        name: impl Into<String>,
        avatar: impl Into<String>,
    ) -> ChatResult<()> {
        let participant = self.get_mut(id)?;
        participant.name = name.into();
        participant.avatar = avatar.into();
        Ok(())
    }

    /// Online participants other than `excluding`.
    pub fn online_except(&self, excluding: ParticipantId) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(move |p| p.id != excluding && p.status == Presence::Online)
    }

    fn get_mut(&mut self, id: ParticipantId) -> ChatResult<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ChatError::UnknownParticipant(id))
    }
}
