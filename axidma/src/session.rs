//! Exclusive access to one device's buffer.
//!
//! At most one [Session] is live per device. The holder state sits behind a single lock, so the
//! "nobody holds it" check and taking ownership happen as one step. The mapper is always called
//! with the lock released.

use crate::{
    buffer::{BufferRegion, MapFlags, MappedRegion, RegionMapper},
    debug_ex,
    device::DeviceState,
    error::{CallerId, MapOverflow, SessionError},
    topology::DeviceTopology,
};
use alloc::{boxed::Box, vec, vec::Vec};
use core::{
    mem,
    sync::atomic::{AtomicUsize, Ordering},
};
use log::warn;
use spin::Mutex;

/// Ids are never reused, so a token from another device or an earlier session never matches.
static NEXT_SESSION_ID: AtomicUsize = AtomicUsize::new(1);
static NEXT_MANAGER_ID: AtomicUsize = AtomicUsize::new(1);

/// An open request, as translated by the access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: CallerId,
    /// The caller holds the administrative capability.
    pub privileged: bool,
    /// The caller asked for exclusive access.
    pub exclusive: bool,
}

/// Token of a live session. Not clonable; [SessionManager::release] consumes it.
///
/// A token belongs to the manager that issued it. Handing it to any other manager gets it back.
#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    id: usize,
    manager: usize,
    holder: CallerId,
}

impl Session {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn holder(&self) -> CallerId {
        self.holder
    }
}

struct ActiveSession {
    id: usize,
    holder: CallerId,
    mappings: Vec<MappedRegion>,
}

enum HolderState {
    Idle,
    Open(ActiveSession),
    /// The device was detached. No session can be opened anymore.
    Retired,
}

pub struct SessionManager<M: RegionMapper> {
    id: usize,
    topology: DeviceTopology,
    buffer: BufferRegion,
    mapper: M,
    holder: Mutex<HolderState>,
}

impl<M: RegionMapper> SessionManager<M> {
    pub fn new(topology: DeviceTopology, buffer: BufferRegion, mapper: M) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            topology,
            buffer,
            mapper,
            holder: Mutex::new(HolderState::Idle),
        }
    }

    pub fn topology(&self) -> &DeviceTopology {
        &self.topology
    }

    pub fn buffer(&self) -> BufferRegion {
        self.buffer
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn holder(&self) -> Option<CallerId> {
        match &*self.holder.lock() {
            HolderState::Open(active) => Some(active.holder),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.holder().is_some()
    }

    pub fn state(&self) -> DeviceState {
        match &*self.holder.lock() {
            HolderState::Idle => DeviceState::Ready,
            HolderState::Open(_) => DeviceState::Attached,
            HolderState::Retired => DeviceState::Uninitialized,
        }
    }

    /// Open the device for `caller`. Never waits for the current holder.
    pub fn open(&self, caller: &Caller) -> Result<Session, SessionError> {
        if !caller.privileged {
            warn!("Rejecting open by {}: not privileged.", caller.id);
            return Err(SessionError::PermissionDenied { caller: caller.id });
        }
        if !caller.exclusive {
            warn!("Rejecting open by {}: exclusive access not requested.", caller.id);
            return Err(SessionError::InvalidRequest { caller: caller.id });
        }

        let mut state = self.holder.lock();
        match &*state {
            HolderState::Idle => {}
            HolderState::Open(active) => {
                return Err(SessionError::AlreadyOpen {
                    holder: active.holder,
                });
            }
            HolderState::Retired => return Err(SessionError::NotAttached),
        }
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        *state = HolderState::Open(ActiveSession {
            id,
            holder: caller.id,
            mappings: vec![],
        });
        debug_ex!("Session {} opened by {}.", id, caller.id);
        Ok(Session {
            id,
            manager: self.id,
            holder: caller.id,
        })
    }

    /// Close `session` and tear down every mapping it still holds.
    ///
    /// Releasing the live session always succeeds. A token this manager did not issue, or one
    /// that is no longer live, is handed back untouched.
    pub fn release(&self, session: Session) -> Result<(), Session> {
        let mappings = {
            let mut state = self.holder.lock();
            if !self.is_live(&state, &session) {
                warn!("Ignoring release of session {}: not live here.", session.id);
                return Err(session);
            }
            match mem::replace(&mut *state, HolderState::Idle) {
                HolderState::Open(active) => active.mappings,
                _ => Vec::new(),
            }
        };
        for region in mappings {
            self.mapper.unmap(region.virt);
        }
        debug_ex!("Session {} released by {}.", session.id, session.holder);
        Ok(())
    }

    fn is_live(&self, state: &HolderState, session: &Session) -> bool {
        session.manager == self.id
            && matches!(state, HolderState::Open(active) if active.id == session.id)
    }

    /// The live session's bookkeeping, if `session` is it.
    fn active_mut<'s>(
        &self,
        state: &'s mut HolderState,
        session: &Session,
    ) -> Option<&'s mut ActiveSession> {
        match state {
            HolderState::Open(active) if session.manager == self.id && active.id == session.id => {
                Some(active)
            }
            _ => None,
        }
    }

    fn check_live(&self, session: &Session) -> Result<(), SessionError> {
        if self.is_live(&self.holder.lock(), session) {
            Ok(())
        } else {
            Err(SessionError::InvalidSession)
        }
    }

    /// Map `[offset, offset + length)` of the buffer for the session holder, uncached.
    pub fn map_region(
        &self,
        session: &Session,
        offset: usize,
        length: usize,
    ) -> Result<MappedRegion, SessionError> {
        self.check_live(session)?;
        let phys = self
            .buffer
            .span(offset, length)
            .ok_or(SessionError::OutOfRange {
                offset,
                length,
                buffer_length: self.buffer.length,
            })?;
        let flags = MapFlags::READ | MapFlags::WRITE | MapFlags::SHARED | MapFlags::NON_CACHED;
        let virt = self.mapper.map(phys.clone(), flags).map_err(|cause| {
            warn!("Unable to map {:#x?}: {}.", phys, cause);
            SessionError::MapFailed {
                range: phys.clone(),
                cause: Box::new(cause),
            }
        })?;
        let Some(end) = virt.checked_add(length) else {
            warn!("Mapping of {:#x?} at {:#x} wraps the address space.", phys, virt);
            self.mapper.unmap(virt..usize::MAX);
            return Err(SessionError::MapFailed {
                range: phys,
                cause: Box::new(MapOverflow { virt, length }),
            });
        };
        let region = MappedRegion {
            virt: virt..end,
            phys,
            flags,
        };

        let recorded = match self.active_mut(&mut self.holder.lock(), session) {
            Some(active) => {
                active.mappings.push(region.clone());
                true
            }
            None => false,
        };
        if !recorded {
            // released while the mapping was being installed
            self.mapper.unmap(region.virt);
            return Err(SessionError::InvalidSession);
        }
        debug_ex!("Session {} mapped {:#x?}.", session.id, region.phys);
        Ok(region)
    }

    /// Tear down one mapping of `session`. Return whether the session held it.
    pub fn unmap_region(
        &self,
        session: &Session,
        region: &MappedRegion,
    ) -> Result<bool, SessionError> {
        let removed = {
            let mut state = self.holder.lock();
            let active = self
                .active_mut(&mut state, session)
                .ok_or(SessionError::InvalidSession)?;
            match active.mappings.iter().position(|mapped| mapped == region) {
                Some(pos) => {
                    active.mappings.swap_remove(pos);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.mapper.unmap(region.virt.clone());
        }
        Ok(removed)
    }

    /// Physical address behind `[addr, addr + size)` of one of the session's mappings.
    pub fn translate(
        &self,
        session: &Session,
        addr: usize,
        size: usize,
    ) -> Result<Option<usize>, SessionError> {
        let mut state = self.holder.lock();
        let active = self
            .active_mut(&mut state, session)
            .ok_or(SessionError::InvalidSession)?;
        Ok(active
            .mappings
            .iter()
            .find_map(|mapped| mapped.translate(addr, size)))
    }

    pub fn mappings(&self, session: &Session) -> Result<Vec<MappedRegion>, SessionError> {
        let mut state = self.holder.lock();
        let active = self
            .active_mut(&mut state, session)
            .ok_or(SessionError::InvalidSession)?;
        Ok(active.mappings.clone())
    }

    /// Stop accepting sessions. Fail with [SessionError::Busy] while one is live.
    pub(crate) fn retire(&self) -> Result<(), SessionError> {
        let mut state = self.holder.lock();
        match &*state {
            HolderState::Idle => {
                *state = HolderState::Retired;
                Ok(())
            }
            HolderState::Open(active) => Err(SessionError::Busy {
                holder: active.holder,
            }),
            HolderState::Retired => Err(SessionError::NotAttached),
        }
    }
}
