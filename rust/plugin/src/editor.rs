//! Main-thread side of the editor bridge: window metrics, the
//! parameter mirror, and the queue ends toward the audio thread. The
//! actual widgets and graphics live in the embedding shim.

use fxhash::FxHashMap;

use crate::controller::EditorEndpoints;
use crate::host::Rgba;
use crate::queue::GuiEvent;

/// Editor window width in logical pixels.
pub const WIDTH: u32 = 480;
/// Editor window height in logical pixels.
pub const HEIGHT: u32 = 720;

/// The window is fixed-size with a 2:3 aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeHints {
    /// Whether the host may resize the window.
    pub can_resize: bool,
    /// Width term of the aspect ratio.
    pub aspect_width: u32,
    /// Height term of the aspect ratio.
    pub aspect_height: u32,
}

/// The hints reported for this editor.
pub const RESIZE_HINTS: ResizeHints = ResizeHints {
    can_resize: false,
    aspect_width: 2,
    aspect_height: 3,
};

/// The platform's native windowing api name; nothing else is accepted.
#[must_use]
pub fn native_api() -> &'static str {
    if cfg!(target_os = "windows") {
        "win32"
    } else if cfg!(target_os = "macos") {
        "cocoa"
    } else {
        "x11"
    }
}

/// Whether the editor can be created for a windowing api; only the
/// embedded native api is accepted.
#[must_use]
pub fn is_api_supported(api: &str, is_floating: bool) -> bool {
    !is_floating && api == native_api()
}

/// Editor-side state: the parameter mirror and theming. One instance
/// exists per open editor window.
#[derive(Debug)]
pub struct Editor {
    endpoints: EditorEndpoints,
    mirror: FxHashMap<u32, f64>,
    custom_color: Option<Rgba>,
    title: String,
}

impl Editor {
    /// Creates the editor state around the controller's queue ends.
    #[must_use]
    pub fn new(endpoints: EditorEndpoints) -> Self {
        Self {
            endpoints,
            mirror: FxHashMap::default(),
            custom_color: None,
            title: String::new(),
        }
    }

    /// Window size in logical pixels.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    /// Scale factors other than 1x are accepted but ignored.
    pub fn set_scale(&mut self, _scale: f64) {}

    /// Stores the host's suggested window title.
    pub fn suggest_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    /// The most recently suggested window title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Host track color for theming; alpha zero clears the custom
    /// theme.
    pub fn update_color(&mut self, color: Rgba) {
        self.custom_color = if color.alpha == 0 { None } else { Some(color) };
    }

    /// The active custom theme color, if any.
    #[must_use]
    pub fn custom_color(&self) -> Option<Rgba> {
        self.custom_color
    }

    /// Drains the audio→gui stream into the mirror. Called once per
    /// frame before drawing.
    pub fn poll(&mut self) {
        while let Some(event) = self.endpoints.from_audio.dequeue() {
            if let GuiEvent::ParamChange { param_id, value } = event {
                self.mirror.insert(param_id, value);
            }
        }
    }

    /// Mirrored value of a parameter, if the mirror has seen it.
    #[must_use]
    pub fn value(&self, param_id: u32) -> Option<f64> {
        self.mirror.get(&param_id).copied()
    }

    /// Seeds the mirror from a full parameter dump, e.g. right after
    /// the editor opens or state was loaded.
    pub fn sync(&mut self, params: impl IntoIterator<Item = (u32, f64)>) {
        self.mirror.clear();
        self.mirror.extend(params);
    }

    // Widget interactions funnel through these three; the audio thread
    // applies them at its next block and echoes the stored values back.

    /// Opens a gesture bracket on a parameter.
    pub fn begin_gesture(&mut self, param_id: u32) {
        self.endpoints
            .to_audio
            .enqueue(GuiEvent::GestureBegin { param_id });
    }

    /// Sends a parameter change toward the audio thread, updating the
    /// local mirror optimistically.
    pub fn change_param(&mut self, param_id: u32, value: f64) {
        self.mirror.insert(param_id, value);
        self.endpoints
            .to_audio
            .enqueue(GuiEvent::ParamChange { param_id, value });
    }

    /// Closes a gesture bracket on a parameter.
    pub fn end_gesture(&mut self, param_id: u32) {
        self.endpoints
            .to_audio
            .enqueue(GuiEvent::GestureEnd { param_id });
    }

    /// Requests appending a fresh envelope.
    pub fn add_envelope(&mut self) {
        self.endpoints.to_audio.enqueue(GuiEvent::EnvelopeAdd);
    }

    /// Requests replacing the envelope at `index`.
    pub fn modify_envelope(&mut self, index: u8, envelope: engine::envelope::Envelope) {
        self.endpoints
            .to_audio
            .enqueue(GuiEvent::EnvelopeModify { index, envelope });
    }

    /// Requests removing the envelope at `index`.
    pub fn remove_envelope(&mut self, index: u8) {
        self.endpoints
            .to_audio
            .enqueue(GuiEvent::EnvelopeRemove { index });
    }
}
