use crate::common::{Room, RoomId};

/// Catalog of rooms, fixed once the session is built.
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    rooms: Vec<Room>,
}

impl RoomDirectory {
    pub fn new(rooms: impl IntoIterator<Item = Room>) -> Self {
        let mut directory = Self::default();
        for room in rooms {
            if directory.contains(&room.id) {
                log::warn!("Duplicate room id `{}` ignored", room.id);
                continue;
            }
            directory.rooms.push(room);
        }
        directory
    }

    /// Rooms in the order they were configured.
    pub fn list(&self) -> &[Room] {
        &self.rooms
    }

    pub fn find(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| &room.id == id)
    }

    pub fn contains(&self, id: &RoomId) -> bool {
        self.find(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.iter().map(|room| &room.id)
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
