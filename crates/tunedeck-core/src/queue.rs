//! Play queue
//!
//! Ordered track ids with a cursor plus shuffle and repeat modes. The queue
//! only decides *which* id comes next; turning an id into a playable track is
//! left to the caller.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::track::TrackId;


/// Errors that can occur when editing the queue.
#[derive( Debug, Error, PartialEq, Eq )]
pub enum QueueError {
    #[error( "Index out of bounds: {index} (queue length {len})" )]
    IndexOutOfBounds { index: usize, len: usize },
}


/// Repeat mode for the queue.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
#[serde( rename_all = "lowercase" )]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}


impl RepeatMode {
    /// Next mode in the repeat button cycle: off → all → one → off.
    pub fn cycle( self ) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}


/// Queue of track ids.
#[derive( Debug, Clone, Default )]
pub struct Queue {
    ids: Vec<TrackId>,
    cursor: usize,
    shuffle: bool,
    repeat: RepeatMode,
    // Indices already played in the current shuffle pass
    visited: HashSet<usize>,
    // Cursors to walk back through with `previous` while shuffling
    history: Vec<usize>,
}


impl Queue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }


    /// Creates a queue positioned at `start`.
    ///
    /// An out-of-range `start` is clamped to the last entry.
    pub fn from_ids( ids: impl IntoIterator<Item = TrackId>, start: usize ) -> Self {
        let mut queue = Self {
            ids: ids.into_iter().collect(),
            ..Self::default()
        };
        queue.cursor = start.min( queue.ids.len().saturating_sub( 1 ) );
        queue.reset_pass();
        queue
    }


    /// Adds a track to the end of the queue.
    pub fn push( &mut self, id: TrackId ) {
        self.ids.push( id );
    }


    /// Adds multiple tracks to the end of the queue.
    pub fn extend( &mut self, ids: impl IntoIterator<Item = TrackId> ) {
        self.ids.extend( ids );
    }


    /// Clears the queue.
    pub fn clear( &mut self ) {
        self.ids.clear();
        self.cursor = 0;
        self.reset_pass();
    }


    /// Removes the entry at `index`.
    ///
    /// Removing the current entry makes the following entry current.
    pub fn remove( &mut self, index: usize ) -> Result<TrackId, QueueError> {
        self.check_index( index )?;

        let removed = self.ids.remove( index );
        if index < self.cursor {
            self.cursor -= 1;
        }
        self.cursor = self.cursor.min( self.ids.len().saturating_sub( 1 ) );
        self.reset_pass();
        Ok( removed )
    }


    /// Moves an entry from one position to another, keeping the cursor on
    /// the same entry.
    ///
    /// @param from - Source index
    /// @param to - Destination index
    pub fn move_item( &mut self, from: usize, to: usize ) -> Result<(), QueueError> {
        self.check_index( from )?;
        self.check_index( to )?;

        if from == to {
            return Ok(());
        }

        let id = self.ids.remove( from );
        self.ids.insert( to, id );

        let current = self.cursor;
        if current == from {
            self.cursor = to;
        } else if from < current && current <= to {
            self.cursor = current - 1;
        } else if to <= current && current < from {
            self.cursor = current + 1;
        }

        self.reset_pass();
        Ok(())
    }


    /// Removes duplicate ids, keeping the first occurrence.
    ///
    /// @returns The number of duplicates removed
    pub fn dedup( &mut self ) -> usize {
        let original_len = self.ids.len();
        let current = self.current().cloned();
        let mut seen = HashSet::new();
        self.ids.retain( |id| seen.insert( id.clone() ) );

        self.cursor = current
            .and_then( |id| self.ids.iter().position( |i| *i == id ) )
            .unwrap_or( 0 );
        self.reset_pass();
        original_len - self.ids.len()
    }


    /// Gets the current track id.
    pub fn current( &self ) -> Option<&TrackId> {
        self.ids.get( self.cursor )
    }


    /// Jumps to a specific entry by index.
    pub fn jump_to( &mut self, index: usize ) -> Option<&TrackId> {
        if index >= self.ids.len() {
            return None;
        }
        self.move_cursor( index );
        self.current()
    }


    /// Advances to the next track id.
    ///
    /// Returns None if the queue is empty or at the end with repeat off. With
    /// repeat one the cursor stays put and the current id is returned.
    pub fn next( &mut self ) -> Option<TrackId> {
        if self.ids.is_empty() {
            return None;
        }

        if self.repeat == RepeatMode::One {
            return self.current().cloned();
        }

        let next_index = if self.shuffle {
            self.next_shuffled()?
        } else if self.cursor + 1 < self.ids.len() {
            self.cursor + 1
        } else {
            match self.repeat {
                RepeatMode::All => 0,
                RepeatMode::Off | RepeatMode::One => return None,
            }
        };

        if self.shuffle {
            self.history.push( self.cursor );
        }
        self.move_cursor( next_index );
        self.current().cloned()
    }


    /// Goes back to the previous track id.
    ///
    /// While shuffling this retraces the order tracks were played in. At the
    /// start with repeat off there is no previous track.
    pub fn previous( &mut self ) -> Option<TrackId> {
        if self.ids.is_empty() {
            return None;
        }

        if self.repeat == RepeatMode::One {
            return self.current().cloned();
        }

        if self.shuffle {
            if let Some( index ) = self.history.pop() {
                self.cursor = index;
                return self.current().cloned();
            }
        }

        let prev_index = if self.cursor > 0 {
            self.cursor - 1
        } else {
            match self.repeat {
                RepeatMode::All => self.ids.len() - 1,
                RepeatMode::Off | RepeatMode::One => return None,
            }
        };

        self.move_cursor( prev_index );
        self.current().cloned()
    }


    /// Sets shuffle and/or repeat. The current track is left alone.
    pub fn set_mode( &mut self, shuffle: Option<bool>, repeat: Option<RepeatMode> ) {
        if let Some( shuffle ) = shuffle {
            self.set_shuffle( shuffle );
        }
        if let Some( repeat ) = repeat {
            self.set_repeat( repeat );
        }
    }


    /// Sets shuffle mode. Turning it on starts a fresh shuffle pass.
    pub fn set_shuffle( &mut self, shuffle: bool ) {
        if shuffle != self.shuffle {
            self.shuffle = shuffle;
            self.reset_pass();
        }
    }


    /// Gets shuffle mode.
    pub fn shuffle( &self ) -> bool {
        self.shuffle
    }


    /// Sets repeat mode.
    pub fn set_repeat( &mut self, repeat: RepeatMode ) {
        self.repeat = repeat;
    }


    /// Gets repeat mode.
    pub fn repeat( &self ) -> RepeatMode {
        self.repeat
    }


    /// Gets all ids in queue order.
    pub fn ids( &self ) -> &[TrackId] {
        &self.ids
    }


    /// Gets the number of entries.
    pub fn len( &self ) -> usize {
        self.ids.len()
    }


    /// Returns true if the queue is empty.
    pub fn is_empty( &self ) -> bool {
        self.ids.is_empty()
    }


    /// Gets the cursor index.
    pub fn cursor( &self ) -> usize {
        self.cursor
    }


    fn check_index( &self, index: usize ) -> Result<(), QueueError> {
        if index < self.ids.len() {
            Ok(())
        } else {
            Err( QueueError::IndexOutOfBounds { index, len: self.ids.len() } )
        }
    }


    fn move_cursor( &mut self, index: usize ) {
        self.cursor = index;
        self.visited.insert( index );
    }


    /// Picks a random index not yet visited in this pass.
    fn next_shuffled( &mut self ) -> Option<usize> {
        let mut candidates = self.unvisited();

        if candidates.is_empty() {
            match self.repeat {
                RepeatMode::All => {
                    self.reset_pass();
                    candidates = self.unvisited();
                    if candidates.is_empty() {
                        // Single entry queue
                        return Some( self.cursor );
                    }
                }
                RepeatMode::Off | RepeatMode::One => return None,
            }
        }

        candidates.choose( &mut rand::thread_rng() ).copied()
    }


    fn unvisited( &self ) -> Vec<usize> {
        ( 0..self.ids.len() )
            .filter( |i| *i != self.cursor && !self.visited.contains( i ) )
            .collect()
    }


    fn reset_pass( &mut self ) {
        self.visited.clear();
        self.history.clear();
        if !self.ids.is_empty() {
            self.visited.insert( self.cursor );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn ids( n: usize ) -> Vec<TrackId> {
        ( 0..n ).map( |i| TrackId::new( format!( "t{}", i ) ) ).collect()
    }


    #[test]
    fn test_empty_queue_has_no_neighbours() {
        let mut queue = Queue::new();
        assert_eq!( queue.next(), None );
        assert_eq!( queue.previous(), None );
        assert_eq!( queue.current(), None );
    }


    #[test]
    fn test_next_previous_round_trip() {
        let len = 5;
        let mut queue = Queue::from_ids( ids( len ), 0 );

        for _ in 0..len - 1 {
            assert!( queue.next().is_some() );
        }
        assert_eq!( queue.cursor(), len - 1 );

        for _ in 0..len - 1 {
            assert!( queue.previous().is_some() );
        }
        assert_eq!( queue.cursor(), 0 );
    }


    #[test]
    fn test_repeat_off_stops_at_boundaries() {
        let mut queue = Queue::from_ids( ids( 3 ), 2 );
        assert_eq!( queue.next(), None );
        assert_eq!( queue.cursor(), 2 );

        queue.jump_to( 0 );
        assert_eq!( queue.previous(), None );
        assert_eq!( queue.cursor(), 0 );
    }


    #[test]
    fn test_repeat_one_returns_current() {
        let mut queue = Queue::from_ids( ids( 3 ), 1 );
        queue.set_repeat( RepeatMode::One );

        assert_eq!( queue.next(), Some( TrackId::from( "t1" ) ) );
        assert_eq!( queue.previous(), Some( TrackId::from( "t1" ) ) );
        assert_eq!( queue.cursor(), 1 );
    }


    #[test]
    fn test_repeat_one_wins_over_shuffle() {
        let mut queue = Queue::from_ids( ids( 4 ), 2 );
        queue.set_mode( Some( true ), Some( RepeatMode::One ) );
        assert_eq!( queue.next(), Some( TrackId::from( "t2" ) ) );
        assert_eq!( queue.cursor(), 2 );
    }


    #[test]
    fn test_repeat_all_wraps() {
        let mut queue = Queue::from_ids( ids( 3 ), 2 );
        queue.set_repeat( RepeatMode::All );
        assert_eq!( queue.next(), Some( TrackId::from( "t0" ) ) );
        assert_eq!( queue.previous(), Some( TrackId::from( "t2" ) ) );
    }


    #[test]
    fn test_shuffle_visits_each_once_per_pass() {
        let len = 8;
        let mut queue = Queue::from_ids( ids( len ), 0 );
        queue.set_shuffle( true );

        let mut seen = HashSet::new();
        seen.insert( queue.current().cloned().unwrap() );
        while let Some( id ) = queue.next() {
            assert!( seen.insert( id ), "id repeated within a shuffle pass" );
        }
        assert_eq!( seen.len(), len );
    }


    #[test]
    fn test_shuffle_repeat_all_starts_new_pass() {
        let mut queue = Queue::from_ids( ids( 3 ), 0 );
        queue.set_mode( Some( true ), Some( RepeatMode::All ) );

        for _ in 0..2 {
            assert!( queue.next().is_some() );
        }
        let last = queue.current().cloned();
        let wrapped = queue.next();
        assert!( wrapped.is_some() );
        assert_ne!( wrapped, last );
    }


    #[test]
    fn test_shuffle_previous_retraces_history() {
        let mut queue = Queue::from_ids( ids( 6 ), 0 );
        queue.set_shuffle( true );

        let first = queue.current().cloned().unwrap();
        let second = queue.next().unwrap();
        let _third = queue.next().unwrap();

        assert_eq!( queue.previous(), Some( second ) );
        assert_eq!( queue.previous(), Some( first ) );
    }


    #[test]
    fn test_set_mode_keeps_current() {
        let mut queue = Queue::from_ids( ids( 4 ), 2 );
        queue.set_mode( Some( true ), Some( RepeatMode::All ) );
        assert_eq!( queue.current(), Some( &TrackId::from( "t2" ) ) );
        queue.set_mode( Some( false ), None );
        assert_eq!( queue.cursor(), 2 );
        assert_eq!( queue.repeat(), RepeatMode::All );
    }


    #[test]
    fn test_remove_adjusts_cursor() {
        let mut queue = Queue::from_ids( ids( 4 ), 2 );
        queue.remove( 0 ).unwrap();
        assert_eq!( queue.current(), Some( &TrackId::from( "t2" ) ) );

        queue.remove( 2 ).unwrap();
        assert_eq!( queue.cursor(), 1 );
        assert_eq!( queue.current(), Some( &TrackId::from( "t2" ) ) );

        assert_eq!(
            queue.remove( 9 ),
            Err( QueueError::IndexOutOfBounds { index: 9, len: 2 } )
        );
    }


    #[test]
    fn test_remove_current_at_end_clamps() {
        let mut queue = Queue::from_ids( ids( 2 ), 1 );
        queue.remove( 1 ).unwrap();
        assert_eq!( queue.cursor(), 0 );
        queue.remove( 0 ).unwrap();
        assert!( queue.is_empty() );
        assert_eq!( queue.cursor(), 0 );
    }


    #[test]
    fn test_move_item_follows_current() {
        let mut queue = Queue::from_ids( ids( 4 ), 1 );
        queue.move_item( 1, 3 ).unwrap();
        assert_eq!( queue.cursor(), 3 );
        assert_eq!( queue.current(), Some( &TrackId::from( "t1" ) ) );

        queue.move_item( 0, 3 ).unwrap();
        assert_eq!( queue.current(), Some( &TrackId::from( "t1" ) ) );
    }


    #[test]
    fn test_dedup_keeps_current() {
        let list = vec![ "a", "b", "a", "c", "b" ].into_iter().map( TrackId::from );
        let mut queue = Queue::from_ids( list, 3 );
        assert_eq!( queue.dedup(), 2 );
        assert_eq!( queue.len(), 3 );
        assert_eq!( queue.current(), Some( &TrackId::from( "c" ) ) );
    }


    #[test]
    fn test_repeat_cycle() {
        assert_eq!( RepeatMode::Off.cycle(), RepeatMode::All );
        assert_eq!( RepeatMode::All.cycle(), RepeatMode::One );
        assert_eq!( RepeatMode::One.cycle(), RepeatMode::Off );
    }
}
