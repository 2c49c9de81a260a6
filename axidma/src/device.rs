//! Device lifecycle.
//!
//! A [DeviceSlot] is where the platform attaches the device once its hardware description is
//! available. The slot owns the only long-lived [Handle] to the device; the access layer keeps a
//! [HandleRef] and upgrades it for the duration of each request, so after [DeviceSlot::detach]
//! every request finds the device gone.

use crate::{
    buffer::{BufferRegion, RegionMapper},
    channel::{ChannelCounts, ChannelDescriptor},
    config::AxiDmaConfig,
    error::{AttachError, SessionError},
    handle::{Handle, HandleRef},
    session::SessionManager,
    topology,
};
use dt::node::{DeviceTree, Node};
use log::info;
use spin::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No topology has been resolved, or the device was detached.
    Uninitialized,
    /// Resolved and waiting for a session.
    Ready,
    /// A session is live.
    Attached,
}

pub struct AxiDmaDevice<M: RegionMapper> {
    config: AxiDmaConfig,
    sessions: SessionManager<M>,
}

impl<M: RegionMapper> AxiDmaDevice<M> {
    pub fn config(&self) -> &AxiDmaConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager<M> {
        &self.sessions
    }

    pub fn num_channels(&self) -> ChannelCounts {
        self.sessions.topology().counts()
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        self.sessions.topology().channels()
    }

    pub fn channel_name(&self, index: usize) -> Option<&str> {
        self.sessions.topology().name_of(index)
    }

    pub fn state(&self) -> DeviceState {
        self.sessions.state()
    }
}

pub struct DeviceSlot<M: RegionMapper> {
    inner: RwLock<Option<Handle<AxiDmaDevice<M>>>>,
}

impl<M: RegionMapper> Default for DeviceSlot<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RegionMapper> DeviceSlot<M> {
    pub const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Resolve the channel topology of `node` and publish the device.
    ///
    /// Nothing is published unless resolution succeeds as a whole.
    pub fn attach(
        &self,
        tree: &DeviceTree,
        node: &Node,
        buffer: BufferRegion,
        mapper: M,
        config: AxiDmaConfig,
    ) -> Result<HandleRef<AxiDmaDevice<M>>, AttachError> {
        if self.inner.read().is_some() {
            return Err(AttachError::AlreadyAttached);
        }
        let declared = topology::count_declared_channels(tree, node)?;
        let topology = topology::resolve(tree, node, declared)?;
        let counts = topology.counts();
        info!(
            "DMA: Found {} transmit channels and {} receive channels.",
            counts.dma_tx, counts.dma_rx
        );
        info!(
            "VDMA: Found {} transmit channels and {} receive channels.",
            counts.vdma_tx, counts.vdma_rx
        );

        let device = Handle::from(AxiDmaDevice {
            config,
            sessions: SessionManager::new(topology, buffer, mapper),
        });
        let mut slot = self.inner.write();
        if slot.is_some() {
            return Err(AttachError::AlreadyAttached);
        }
        let res = device.create_ref();
        info!(
            "Attached {} at {} with a {:#x} byte buffer.",
            tree.get_full_path(node),
            device.config.device_path(),
            buffer.length
        );
        *slot = Some(device);
        Ok(res)
    }

    /// Drop the device. Fail with [SessionError::Busy] while a session is live.
    pub fn detach(&self) -> Result<(), SessionError> {
        let mut slot = self.inner.write();
        let device = slot.as_ref().ok_or(SessionError::NotAttached)?;
        device.sessions.retire()?;
        *slot = None;
        info!("Detached.");
        Ok(())
    }

    pub fn get(&self) -> Option<HandleRef<AxiDmaDevice<M>>> {
        self.inner.read().as_ref().map(Handle::create_ref)
    }

    pub fn state(&self) -> DeviceState {
        match &*self.inner.read() {
            Some(device) => device.state(),
            None => DeviceState::Uninitialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{Direction, EngineType},
        error::{CallerId, TopologyError},
        session::Caller,
        testing::{BUFFER_BASE, BUFFER_LEN, MockMapper, add_client, add_core, two_channel_tree},
    };
    use dt::builder::DeviceTreeBuilder;

    const ROOT: Caller = Caller {
        id: CallerId(0),
        privileged: true,
        exclusive: true,
    };

    fn buffer() -> BufferRegion {
        BufferRegion::new(BUFFER_BASE, BUFFER_LEN)
    }

    #[test]
    fn lifecycle_follows_sessions() {
        let (tree, client) = two_channel_tree();
        let node = tree.node(client).unwrap();
        let slot = DeviceSlot::new();
        assert_eq!(slot.state(), DeviceState::Uninitialized);

        let device_ref = slot
            .attach(&tree, node, buffer(), MockMapper::default(), AxiDmaConfig::default())
            .unwrap();
        assert_eq!(slot.state(), DeviceState::Ready);

        let device = device_ref.get_handle().unwrap();
        assert_eq!(device.num_channels().total(), 2);
        assert_eq!(device.channel_name(1), Some("rx_channel"));
        assert_eq!(device.channels()[0].direction, Direction::ToDevice);
        assert!(
            device
                .sessions()
                .topology()
                .find(1, EngineType::Dma, Direction::FromDevice)
                .is_some()
        );

        let session = device.sessions().open(&ROOT).unwrap();
        assert_eq!(slot.state(), DeviceState::Attached);
        assert!(matches!(
            slot.detach(),
            Err(SessionError::Busy { holder: CallerId(0) })
        ));
        device.sessions().release(session).unwrap();
        assert_eq!(slot.state(), DeviceState::Ready);
        drop(device);

        slot.detach().unwrap();
        assert_eq!(slot.state(), DeviceState::Uninitialized);
        assert!(device_ref.get_handle().is_none());
        assert!(slot.get().is_none());
        assert!(matches!(slot.detach(), Err(SessionError::NotAttached)));
    }

    #[test]
    fn failed_resolution_publishes_nothing() {
        let mut builder = DeviceTreeBuilder::new();
        add_core(&mut builder, "dma@40400000", 1, &["mm2s-dma"]);
        add_client(&mut builder, &["tx_channel", "rx_channel"], &[1, 0, 1, 1]);
        let tree = builder.build();
        let node = tree.get_node("/axidma_chrdev").unwrap();

        let slot = DeviceSlot::new();
        let err = slot
            .attach(&tree, node, buffer(), MockMapper::default(), AxiDmaConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AttachError::Topology(TopologyError::InvalidTopology { .. })
        ));
        assert_eq!(slot.state(), DeviceState::Uninitialized);
        assert!(slot.get().is_none());
    }

    #[test]
    fn second_attach_is_rejected() {
        let (tree, client) = two_channel_tree();
        let node = tree.node(client).unwrap();
        let slot = DeviceSlot::new();
        let first = slot
            .attach(&tree, node, buffer(), MockMapper::default(), AxiDmaConfig::default())
            .unwrap();
        let config = AxiDmaConfig::default().with_chrdev_name("axidma1");
        assert_eq!(
            slot.attach(&tree, node, buffer(), MockMapper::default(), config)
                .err(),
            Some(AttachError::AlreadyAttached)
        );
        let device = first.get_handle().unwrap();
        assert_eq!(device.config().device_path(), "/dev/axidma");
    }

    #[test]
    fn stale_handles_cannot_reopen() {
        let (tree, client) = two_channel_tree();
        let node = tree.node(client).unwrap();
        let slot = DeviceSlot::new();
        let device = slot
            .attach(&tree, node, buffer(), MockMapper::default(), AxiDmaConfig::default())
            .unwrap()
            .get_handle()
            .unwrap();
        slot.detach().unwrap();
        assert_eq!(device.state(), DeviceState::Uninitialized);
        assert!(matches!(
            device.sessions().open(&ROOT),
            Err(SessionError::NotAttached)
        ));
    }
}
