//! Host-facing lifecycle and event dispatch.

use engine::synth::{base_param, SynthKind, VibratoPreset};
use num_traits::FromPrimitive;

use crate::events::{EventData, InputEvent, OutputEvent, OutputSink, ProcessStatus, Transport};
use crate::host::{ContextMenuHost, DenormalGuard, HostLog, LogSeverity, Rgba};
use crate::instrument::{split_id, synth_param, Instrument, Module};
use crate::queue::{channel, Consumer, GuiEvent, Producer, QUEUE_CAPACITY};
use crate::state;

#[cfg(test)]
mod tests;

/// Where a parameter change should be mirrored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendFlags {
    /// Emit the stored value as a host output event.
    pub to_host: bool,
    /// Echo the stored value to the editor's mirror.
    pub to_gui: bool,
    /// Guards the vibrato cross-writes against re-entry.
    pub no_recursion: bool,
}

/// Mirror a change to the host only; used for editor-originated writes.
pub const SEND_TO_HOST: SendFlags = SendFlags {
    to_host: true,
    to_gui: false,
    no_recursion: false,
};

/// Mirror a change to the editor only; used for host-originated writes.
pub const SEND_TO_GUI: SendFlags = SendFlags {
    to_host: false,
    to_gui: true,
    no_recursion: false,
};

const SEND_LINKED: SendFlags = SendFlags {
    to_host: true,
    to_gui: true,
    no_recursion: true,
};

/// The editor's ends of the two queues: events toward the audio thread
/// and the mirror stream coming back.
#[derive(Debug)]
pub struct EditorEndpoints {
    /// Events the editor sends toward the audio thread.
    pub to_audio: Producer<GuiEvent, QUEUE_CAPACITY>,
    /// Mirror stream coming back from the audio thread.
    pub from_audio: Consumer<GuiEvent, QUEUE_CAPACITY>,
}

/// The host-facing core: owns the instrument, dispatches events, and
/// bridges parameters between host and editor.
pub struct Controller {
    instrument: Instrument,
    from_gui: Consumer<GuiEvent, QUEUE_CAPACITY>,
    to_gui: Producer<GuiEvent, QUEUE_CAPACITY>,
    editor_endpoints: Option<EditorEndpoints>,
    log: Option<Box<dyn HostLog>>,
    context_menu: Option<Box<dyn ContextMenuHost>>,
    track_color: Option<Rgba>,
}

impl Controller {
    /// Creates a controller owning an instrument of the given kind.
    #[must_use]
    pub fn new(kind: SynthKind) -> Self {
        let (gui_producer, from_gui) = channel();
        let (to_gui, gui_consumer) = channel();
        Self {
            instrument: Instrument::new(kind),
            from_gui,
            to_gui,
            editor_endpoints: Some(EditorEndpoints {
                to_audio: gui_producer,
                from_audio: gui_consumer,
            }),
            log: None,
            context_menu: None,
            track_color: None,
        }
    }

    /// Installs the host's log facility.
    pub fn set_log(&mut self, log: Box<dyn HostLog>) {
        self.log = Some(log);
    }

    /// Installs the host's context-menu facility.
    pub fn set_context_menu_host(&mut self, host: Box<dyn ContextMenuHost>) {
        self.context_menu = Some(host);
    }

    /// Forwards an editor right-click on a parameter to the host.
    pub fn request_context_menu(&self, param_id: u32) {
        if let Some(menu) = &self.context_menu {
            menu.popup_context_menu(param_id);
        }
    }

    /// Hands out the editor's queue ends; only one editor can exist.
    pub fn take_editor_endpoints(&mut self) -> Option<EditorEndpoints> {
        self.editor_endpoints.take()
    }

    /// Records the host track's color for editor theming.
    pub fn track_info_changed(&mut self, color: Option<Rgba>) {
        self.track_color = color;
    }

    /// The stored track color, if the host provided one.
    #[must_use]
    pub fn track_color(&self) -> Option<Rgba> {
        self.track_color
    }

    /// The owned instrument.
    #[must_use]
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Mutable access to the owned instrument.
    pub fn instrument_mut(&mut self) -> &mut Instrument {
        &mut self.instrument
    }

    fn log_message(&self, severity: LogSeverity, message: &str) {
        if let Some(log) = &self.log {
            log.log(severity, message);
        }
    }

    // ---- lifecycle ------------------------------------------------------

    /// Prepares for audio processing at the given rate and maximum
    /// block length.
    pub fn activate(&mut self, sample_rate: f64, max_frames: usize) {
        self.instrument.activate(sample_rate, max_frames);
    }

    /// Releases processing resources; gui events keep accumulating and
    /// drain on the next activation's first block.
    pub fn deactivate(&mut self) {
        self.instrument.deactivate();
    }

    // ---- processing -----------------------------------------------------

    /// Processes one host block. `events` must be sorted by time and
    /// carry offsets within the block; `left` and `right` are the
    /// stereo output.
    pub fn process(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        events: &[InputEvent],
        transport: Option<&Transport>,
        sink: &mut impl OutputSink,
    ) -> ProcessStatus {
        let _denormals = DenormalGuard::new();

        self.drain_gui_events(sink);

        if let Some(transport) = transport {
            self.instrument.apply_transport(transport);
        }

        let frame_count = left.len();
        let mut i = 0usize;
        let mut next_event = 0usize;
        while i < frame_count {
            // Everything scheduled at this frame happens before the
            // samples at and after it are rendered.
            while next_event < events.len() && (events[next_event].time as usize) <= i {
                let event = events[next_event];
                self.process_event(&event, sink);
                next_event += 1;
            }
            let span_end = events
                .get(next_event)
                .map_or(frame_count, |event| (event.time as usize).min(frame_count));
            self.instrument.process(
                &mut left[i..span_end],
                &mut right[i..span_end],
                i as u32,
                sink,
            );
            i = span_end;
        }
        // Events at or past the block end still dispatch.
        while next_event < events.len() {
            let event = events[next_event];
            self.process_event(&event, sink);
            next_event += 1;
        }

        if self.instrument.active_voice_count() > 0 {
            ProcessStatus::Continue
        } else {
            ProcessStatus::Sleep
        }
    }

    fn process_event(&mut self, event: &InputEvent, sink: &mut impl OutputSink) {
        match event.data {
            EventData::NoteOn {
                note_id,
                port,
                channel,
                key,
                velocity,
            } => {
                self.instrument
                    .begin_note(key, velocity, note_id, port, channel, event.time, sink);
            }
            EventData::NoteOff {
                note_id,
                port,
                channel,
                key,
            } => {
                self.instrument.end_notes(key, note_id, port, channel);
            }
            EventData::ParamValue { param_id, value } => {
                self.set_value(param_id, value, SEND_TO_GUI, sink);
            }
            EventData::Transport(transport) => {
                self.instrument.apply_transport(&transport);
            }
            EventData::Midi { port, bytes } => {
                self.process_midi(port, bytes, event.time, sink);
            }
            EventData::NoteChoke
            | EventData::NoteExpression
            | EventData::ParamMod
            | EventData::MidiSysex
            | EventData::Midi2 => {}
        }
    }

    fn process_midi(&mut self, port: i16, bytes: [u8; 3], time: u32, sink: &mut impl OutputSink) {
        let status = bytes[0] & 0xF0;
        let channel = i16::from(bytes[0] & 0x0F);
        let key = i16::from(bytes[1]);

        if status == 0x80 || (status == 0x90 && bytes[2] == 0) {
            self.instrument.end_notes(key, -1, port, channel);
        } else if status == 0x90 {
            let velocity = f64::from(bytes[2]) / 127.0;
            self.instrument
                .begin_note(key, velocity, -1, port, channel, time, sink);
        } else if status == 0xB0 && bytes[1] == 123 && bytes[2] == 0 {
            // All notes off.
            self.instrument.end_notes(-1, -1, port, channel);
        }
    }

    fn drain_gui_events(&mut self, sink: &mut impl OutputSink) {
        while let Some(event) = self.from_gui.dequeue() {
            match event {
                GuiEvent::ParamChange { param_id, value } => {
                    self.set_value(param_id, value, SEND_TO_HOST, sink);
                }
                GuiEvent::GestureBegin { param_id } => {
                    sink.push(OutputEvent::ParamGestureBegin { param_id });
                }
                GuiEvent::GestureEnd { param_id } => {
                    sink.push(OutputEvent::ParamGestureEnd { param_id });
                }
                GuiEvent::EnvelopeAdd => {
                    self.instrument.synth_mut().add_envelope();
                }
                GuiEvent::EnvelopeModify { index, envelope } => {
                    self.instrument
                        .synth_mut()
                        .set_envelope(usize::from(index), envelope);
                }
                GuiEvent::EnvelopeRemove { index } => {
                    self.instrument.synth_mut().remove_envelope(usize::from(index));
                }
            }
        }
    }

    // ---- parameters -----------------------------------------------------

    /// Total number of parameters.
    #[must_use]
    pub fn params_count(&self) -> usize {
        self.instrument.params_count()
    }

    /// Global id of the parameter at `index` in presentation order.
    #[must_use]
    pub fn param_id_at(&self, index: usize) -> Option<u32> {
        self.instrument.param_id_at(index)
    }

    /// Current value of a parameter.
    #[must_use]
    pub fn get_value(&self, id: u32) -> Option<f64> {
        self.instrument.get_param(id)
    }

    /// Applies a parameter change and mirrors it per `flags`. The
    /// mirrored value is the stored one, after clamping. Returns false
    /// for unknown ids and unrepresentable values, leaving state
    /// untouched.
    pub fn set_value(
        &mut self,
        id: u32,
        value: f64,
        flags: SendFlags,
        sink: &mut impl OutputSink,
    ) -> bool {
        let Ok(stored) = self.instrument.set_param(id, value) else {
            return false;
        };

        if flags.to_host {
            sink.push(OutputEvent::ParamValue {
                param_id: id,
                value: stored,
            });
        }
        if flags.to_gui {
            self.to_gui.enqueue(GuiEvent::ParamChange {
                param_id: id,
                value: stored,
            });
        }

        // Choosing a vibrato preset writes its derived parameters;
        // editing a derived parameter flips the preset to Custom. The
        // host has to see those writes, so they happen here rather
        // than inside the engine.
        if !flags.no_recursion {
            self.vibrato_linkage(id, stored, sink);
        }
        true
    }

    fn vibrato_linkage(&mut self, id: u32, stored: f64, sink: &mut impl OutputSink) {
        let (module, local) = split_id(id);
        if module != Some(Module::Synth) {
            return;
        }
        match local as usize {
            base_param::VIBRATO_PRESET => {
                let Some(preset) = VibratoPreset::from_f64(stored) else {
                    return;
                };
                if let Some(params) = preset.params() {
                    self.set_value(
                        synth_param(base_param::VIBRATO_DEPTH),
                        params.depth,
                        SEND_LINKED,
                        sink,
                    );
                    self.set_value(
                        synth_param(base_param::VIBRATO_SPEED),
                        params.speed,
                        SEND_LINKED,
                        sink,
                    );
                    self.set_value(
                        synth_param(base_param::VIBRATO_DELAY),
                        params.delay,
                        SEND_LINKED,
                        sink,
                    );
                    self.set_value(
                        synth_param(base_param::VIBRATO_TYPE),
                        f64::from(params.kind as u8),
                        SEND_LINKED,
                        sink,
                    );
                }
            }
            base_param::VIBRATO_DEPTH
            | base_param::VIBRATO_SPEED
            | base_param::VIBRATO_DELAY
            | base_param::VIBRATO_TYPE => {
                let preset_id = synth_param(base_param::VIBRATO_PRESET);
                if let Some(preset) = self.instrument.get_param(preset_id) {
                    if preset != f64::from(VibratoPreset::Custom as u8) {
                        self.set_value(
                            preset_id,
                            f64::from(VibratoPreset::Custom as u8),
                            SEND_LINKED,
                            sink,
                        );
                    }
                }
            }
            _ => {}
        }
    }

    /// Formats a value the way the host displays it: enum labels where
    /// they exist, integers for stepped parameters, one decimal for
    /// continuous ones.
    #[must_use]
    pub fn value_to_text(&self, id: u32, value: f64) -> Option<String> {
        let info = self.instrument.param_info(id)?;
        if info.is_stepped() {
            if let Some(values) = info.enum_values {
                let index = (value as i64).clamp(0, values.len() as i64 - 1) as usize;
                return Some(values[index].to_string());
            }
            return Some(format!("{}", value as i64));
        }
        Some(format!("{value:.1}"))
    }

    /// Parses a display string back into a value: enum labels map to
    /// their index, everything else parses numerically.
    #[must_use]
    pub fn text_to_value(&self, id: u32, text: &str) -> Option<f64> {
        let info = self.instrument.param_info(id)?;
        if info.is_stepped() {
            if let Some(values) = info.enum_values {
                return values
                    .iter()
                    .position(|label| *label == text)
                    .map(|index| index as f64);
            }
            return text.trim().parse::<i64>().ok().map(|value| value as f64);
        }
        text.trim().parse::<f64>().ok()
    }

    // ---- persistence ----------------------------------------------------

    /// Serializes the instrument's state, logging any failure.
    pub fn state_save(&self, writer: &mut impl std::io::Write) -> bool {
        match state::save(&self.instrument, writer) {
            Ok(()) => true,
            Err(error) => {
                self.log_message(LogSeverity::Error, &format!("state save failed: {error:?}"));
                false
            }
        }
    }

    /// Loads persisted state. Whatever the outcome, the gui mirror is
    /// resynchronized with the surviving parameter values.
    pub fn state_load(&mut self, reader: &mut impl std::io::Read) -> bool {
        let result = state::load(&mut self.instrument, reader);
        self.resync_gui();
        match result {
            Ok(()) => true,
            Err(error) => {
                self.log_message(LogSeverity::Error, &format!("state load failed: {error:?}"));
                false
            }
        }
    }

    fn resync_gui(&mut self) {
        let ids: Vec<u32> = self.instrument.param_ids().collect();
        for id in ids {
            if let Some(value) = self.instrument.get_param(id) {
                self.to_gui.enqueue(GuiEvent::ParamChange {
                    param_id: id,
                    value,
                });
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("instrument", &self.instrument)
            .finish_non_exhaustive()
    }
}
