// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::BTreeSet, mem, sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info, span, Level};

use crate::{
    config::{self, Backend, ConfigError, PatchEntry},
    device::{Device, DeviceError},
    dmx::{
        ola_client::OlaTransport,
        sacn::{InboundFrame, SacnReceiver, SacnSender},
        transport::OutputStatus,
        DmxBuffers, DmxOutput, DmxTransport, OutputHandle,
    },
    fixture::{
        catalog::{Catalog, CatalogError},
        FixtureProfile,
    },
    patch::{
        commands::{InsertOutput, PatchChannel, PatchSelection},
        Address, PatchError, PatchEvent, PatchTable,
    },
    shutdown::ShutdownHandle,
    undo::{Command, UndoError, Undoable, UndoManager},
};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("nothing to undo")]
    EmptyUndoStack,

    #[error("nothing to redo")]
    EmptyRedoStack,

    #[error("DMX transport error: {0}")]
    Transport(String),
}

impl From<UndoError<PatchError>> for ConsoleError {
    fn from(err: UndoError<PatchError>) -> ConsoleError {
        match err {
            UndoError::EmptyUndoStack => ConsoleError::EmptyUndoStack,
            UndoError::EmptyRedoStack => ConsoleError::EmptyRedoStack,
            UndoError::Command(err) => ConsoleError::Patch(err),
        }
    }
}

/// The patch together with the frames it draws into. This is the state undo covers.
pub struct Rig {
    patch: PatchTable,
    dmx: DmxBuffers,
    events: Vec<PatchEvent>,
}

impl Rig {
    pub fn new(universes: &[u16], output: OutputHandle) -> Rig {
        Rig {
            patch: PatchTable::new(),
            dmx: DmxBuffers::new(universes, output),
            events: Vec::new(),
        }
    }

    pub fn patch(&self) -> &PatchTable {
        &self.patch
    }

    pub fn dmx(&self) -> &DmxBuffers {
        &self.dmx
    }

    pub fn patch_channel(
        &mut self,
        channel: u16,
        address: Address,
        profile: Arc<FixtureProfile>,
    ) -> Result<(), PatchError> {
        let events = self
            .patch
            .patch_channel(&mut self.dmx, channel, address, profile)?;
        self.events.extend(events);
        Ok(())
    }

    pub fn insert_output(
        &mut self,
        channel: u16,
        address: Address,
        profile: Arc<FixtureProfile>,
    ) -> Result<(), PatchError> {
        let events = self
            .patch
            .insert_output(&mut self.dmx, channel, address, profile)?;
        self.events.extend(events);
        Ok(())
    }

    pub fn patch_selection(
        &mut self,
        channels: &[u16],
        address: Address,
        profile: Arc<FixtureProfile>,
    ) -> Result<(), PatchError> {
        let events = self
            .patch
            .patch_selection(&mut self.dmx, channels, address, profile)?;
        self.events.extend(events);
        Ok(())
    }

    pub fn update_channel<F>(&mut self, channel: u16, apply: F) -> Result<(), PatchError>
    where
        F: FnMut(&mut Device) -> Result<(), DeviceError>,
    {
        self.patch.update_channel(&mut self.dmx, channel, apply)
    }

    /// Takes the patch changes recorded since the last call.
    pub fn take_events(&mut self) -> Vec<PatchEvent> {
        mem::take(&mut self.events)
    }
}

impl Undoable for Rig {
    type Snapshot = PatchTable;
    type Error = PatchError;

    fn copy(&self) -> PatchTable {
        self.patch.clone()
    }

    /// Puts the patch back and redraws every frame from it.
    fn restore(&mut self, snapshot: PatchTable) {
        self.patch = snapshot;
        self.patch.rebuild(&mut self.dmx);
    }

    fn undone(&mut self) {
        self.events.push(PatchEvent::Restored);
    }

    fn redone(&mut self) {
        self.events.push(PatchEvent::Restored);
    }
}

/// The console: the fixture catalog, the rig, its undo history and the sACN plumbing.
/// Everything here is driven from a single thread. The output and receiver threads
/// are started when the console opens and stopped when it shuts down or drops.
pub struct Console {
    catalog: Catalog,
    rig: Rig,
    undo: UndoManager<Rig>,
    output: DmxOutput,
    receiver: Option<SacnReceiver>,
    inbound: Receiver<InboundFrame>,
    inbound_sender: Sender<InboundFrame>,
}

impl Console {
    /// Opens the console described by the configuration and applies its startup patch.
    pub fn open(config: &config::Console) -> Result<Console, ConsoleError> {
        let catalog = Catalog::load(&config.fixtures())?;
        let universes = config.universes();
        let output = config.output();
        let input = config.input();

        let (transport, cid): (Box<dyn DmxTransport>, Option<[u8; 16]>) = match output.backend()
        {
            Backend::Sacn => {
                let sender = SacnSender::new(
                    &output.source_name(),
                    output.priority(),
                    output.destination()?,
                )
                .map_err(|e| ConsoleError::Transport(e.to_string()))?;
                let cid = sender.cid();
                let transport: Box<dyn DmxTransport> = Box::new(sender);
                (transport, Some(cid))
            }
            Backend::Ola => {
                let transport: Box<dyn DmxTransport> = Box::new(
                    OlaTransport::connect(output.ola_port())
                        .map_err(|e| ConsoleError::Transport(e.to_string()))?,
                );
                (transport, None)
            }
        };

        let mut console = Console::with_transport(
            catalog,
            transport,
            output.keepalive()?,
            &universes,
            config.undo_limit(),
            input.queue_size(),
        );

        if input.enabled() {
            let receiver = SacnReceiver::start(&universes, cid, console.inbound_sender.clone())
                .map_err(|e| ConsoleError::Transport(e.to_string()))?;
            console.receiver = Some(receiver);
        }

        console.apply_patch(config.patch())?;
        info!(
            universes = ?universes,
            channels = console.rig.patch().len(),
            "Console open"
        );
        Ok(console)
    }

    /// Builds a console around an existing transport. No receiver is started.
    pub fn with_transport(
        catalog: Catalog,
        transport: Box<dyn DmxTransport>,
        keepalive: Duration,
        universes: &[u16],
        undo_limit: usize,
        queue_size: usize,
    ) -> Console {
        info!(transport = transport.name(), "Starting DMX output");
        let output = DmxOutput::start(transport, keepalive);
        let (inbound_sender, inbound) = crossbeam_channel::bounded(queue_size.max(1));

        Console {
            catalog,
            rig: Rig::new(universes, output.handle()),
            undo: UndoManager::new(undo_limit),
            output,
            receiver: None,
            inbound,
            inbound_sender,
        }
    }

    /// Patches the configured channels. A channel listed more than once gets an
    /// output for each entry. None of this goes into the undo history.
    fn apply_patch(&mut self, entries: &[PatchEntry]) -> Result<(), ConsoleError> {
        for entry in entries {
            let fixture = entry.fixture();
            let profile =
                self.catalog
                    .load_profile(fixture.manufacturer(), fixture.model(), fixture.mode())?;
            let address = entry.address()?;

            if self.rig.patch().is_patched(entry.channel()) {
                self.rig.insert_output(entry.channel(), address, profile)?;
            } else {
                self.rig.patch_channel(entry.channel(), address, profile)?;
            }
        }
        Ok(())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn load_profile(
        &mut self,
        manufacturer: &str,
        model: &str,
        mode: &str,
    ) -> Result<Arc<FixtureProfile>, ConsoleError> {
        Ok(self.catalog.load_profile(manufacturer, model, mode)?)
    }

    pub fn patch(&self) -> &PatchTable {
        self.rig.patch()
    }

    pub fn dmx(&self) -> &DmxBuffers {
        self.rig.dmx()
    }

    pub fn channel_footprint(&self, channel: u16) -> u32 {
        self.rig.patch().channel_footprint(channel)
    }

    fn execute(&mut self, command: Box<dyn Command<Rig>>) -> Result<(), ConsoleError> {
        Ok(self.undo.execute(&mut self.rig, command)?)
    }

    /// Patches a channel to a single device. An output of 0 depatches it.
    pub fn patch_channel(
        &mut self,
        channel: u16,
        address: Address,
        profile: Arc<FixtureProfile>,
    ) -> Result<(), ConsoleError> {
        self.execute(Box::new(PatchChannel::new(channel, address, profile)))
    }

    /// Adds another device to a channel.
    pub fn insert_output(
        &mut self,
        channel: u16,
        address: Address,
        profile: Arc<FixtureProfile>,
    ) -> Result<(), ConsoleError> {
        self.execute(Box::new(InsertOutput::new(channel, address, profile)))
    }

    /// Patches a selection of channels to consecutive blocks. Without a profile, the
    /// selection keeps the fixture its channels are already patched with, or gets
    /// dimmers if none of them are.
    pub fn patch_selection(
        &mut self,
        channels: &[u16],
        address: Address,
        profile: Option<Arc<FixtureProfile>>,
    ) -> Result<(), ConsoleError> {
        let profile = match profile {
            Some(profile) => profile,
            None => channels
                .iter()
                .find_map(|channel| self.rig.patch().profile(*channel).cloned())
                .unwrap_or_else(|| Arc::new(FixtureProfile::dimmer())),
        };
        self.execute(Box::new(PatchSelection::new(
            channels.to_vec(),
            address,
            profile,
        )))
    }

    /// Zeroes a channel's outputs and removes it from the patch.
    pub fn depatch(&mut self, channel: u16) -> Result<(), ConsoleError> {
        let profile = self
            .rig
            .patch()
            .profile(channel)
            .cloned()
            .ok_or(PatchError::NotPatched(channel))?;
        self.execute(Box::new(PatchChannel::new(
            channel,
            Address::new(0, 0),
            profile,
        )))
    }

    pub fn set_parameter(
        &mut self,
        channel: u16,
        parameter: &str,
        value: u32,
    ) -> Result<(), ConsoleError> {
        Ok(self.rig.update_channel(channel, |device| {
            device.set_parameter(parameter, value).map(|_| ())
        })?)
    }

    /// Moves a parameter by wheel steps on every device of the channel.
    pub fn step_parameter(
        &mut self,
        channel: u16,
        parameter: &str,
        steps: i32,
        fine: bool,
    ) -> Result<(), ConsoleError> {
        Ok(self.rig.update_channel(channel, |device| {
            device.step_parameter(parameter, steps, fine).map(|_| ())
        })?)
    }

    pub fn home(&mut self, channel: u16) -> Result<(), ConsoleError> {
        Ok(self.rig.update_channel(channel, |device| {
            device.home();
            Ok(())
        })?)
    }

    pub fn highlight(&mut self, channel: u16) -> Result<(), ConsoleError> {
        Ok(self.rig.update_channel(channel, |device| {
            device.highlight();
            Ok(())
        })?)
    }

    pub fn undo(&mut self) -> Result<(), ConsoleError> {
        Ok(self.undo.undo(&mut self.rig)?)
    }

    pub fn redo(&mut self) -> Result<(), ConsoleError> {
        Ok(self.undo.redo(&mut self.rig)?)
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn undo_name(&self) -> Option<String> {
        self.undo.undo_name()
    }

    pub fn redo_name(&self) -> Option<String> {
        self.undo.redo_name()
    }

    pub fn take_events(&mut self) -> Vec<PatchEvent> {
        self.rig.take_events()
    }

    pub fn output_status(&self) -> OutputStatus {
        self.output.status()
    }

    /// Gets a sender for the inbound queue, for sources other than the sACN receiver.
    pub fn inbound_sender(&self) -> Sender<InboundFrame> {
        self.inbound_sender.clone()
    }

    /// Drains the inbound queue and returns the universes that heard from another
    /// source. Remote levels are not merged into the rig.
    pub fn tick(&mut self) -> BTreeSet<u16> {
        let mut refreshed = BTreeSet::new();
        for frame in self.inbound.try_iter() {
            if frame.terminated {
                info!(
                    universe = frame.universe,
                    source = %frame.source_name,
                    "Remote sACN source stopped"
                );
            }
            refreshed.insert(frame.universe);
        }
        if !refreshed.is_empty() {
            debug!(universes = ?refreshed, "Remote sACN data received");
        }
        refreshed
    }

    /// Runs the console loop until shutdown is requested.
    pub fn run(&mut self, tick: Duration, shutdown: &ShutdownHandle) {
        let span = span!(Level::INFO, "console");
        let _enter = span.enter();
        info!(tick = ?tick, "Console running");

        while !shutdown.wait_timeout(tick) {
            self.tick();
            for event in self.take_events() {
                debug!(event = ?event, "Patch changed");
            }
        }

        info!("Console loop stopped");
    }

    /// Stops the receiver and then the output. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
        }
        self.output.stop();
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.shutdown();
    }
}
