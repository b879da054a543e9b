//! WebP Image Element
//!
//! An `<img>` that shows a WebP alternative when the host can decode it and
//! the conventional source otherwise. While the needed capability is unknown
//! it shows a transparent placeholder and asks the [`CapabilityService`] for
//! a probe.
//!
//! Lifecycle, driven by the host:
//! 1. [`ImageWebp::render`] computes the element for the current state.
//! 2. [`ImageWebp::mount`] (and [`ImageWebp::update`] after prop changes)
//!    starts a probe when the placeholder was rendered.
//! 3. [`ImageWebp::capability_ready`] resolves once probing settles; the host
//!    renders again.

use crate::capability::CapabilityResult;
use crate::events::{EventHandler, ImageEvent, ImageEventType};
use crate::selector::{ActualSource, PLACEHOLDER_SRC};
use crate::service::CapabilityService;
use std::fmt;
use std::sync::Arc;

/// Ordered inline style declarations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing an earlier value in place
    pub fn set(mut self, name: &str, value: &str) -> Self {
        match self.declarations.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.declarations.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Serialize as a `style` attribute value
    pub fn to_css(&self) -> String {
        self.declarations
            .iter()
            .map(|(n, v)| format!("{}: {};", n, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Element props
#[derive(Clone, Default)]
pub struct ImageWebpProps {
    /// Conventional-format source
    pub src: String,
    /// WebP alternative
    pub src_webp: Option<String>,
    pub class_name: Option<String>,
    pub style: Option<InlineStyle>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub alt: String,
    pub on_load: Option<EventHandler>,
    pub on_mouse_move: Option<EventHandler>,
    pub on_mouse_leave: Option<EventHandler>,
}

impl ImageWebpProps {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Default::default()
        }
    }

    pub fn webp(mut self, src_webp: impl Into<String>) -> Self {
        self.src_webp = Some(src_webp.into());
        self
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn style(mut self, style: InlineStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = alt.into();
        self
    }

    pub fn on_load(mut self, handler: impl Fn(&ImageEvent) + Send + Sync + 'static) -> Self {
        self.on_load = Some(Arc::new(handler));
        self
    }

    pub fn on_mouse_move(mut self, handler: impl Fn(&ImageEvent) + Send + Sync + 'static) -> Self {
        self.on_mouse_move = Some(Arc::new(handler));
        self
    }

    pub fn on_mouse_leave(mut self, handler: impl Fn(&ImageEvent) + Send + Sync + 'static) -> Self {
        self.on_mouse_leave = Some(Arc::new(handler));
        self
    }

    fn handler(&self, event_type: ImageEventType) -> Option<&EventHandler> {
        match event_type {
            ImageEventType::Load => self.on_load.as_ref(),
            ImageEventType::MouseMove => self.on_mouse_move.as_ref(),
            ImageEventType::MouseLeave => self.on_mouse_leave.as_ref(),
        }
    }
}

impl fmt::Debug for ImageWebpProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageWebpProps")
            .field("src", &self.src)
            .field("src_webp", &self.src_webp)
            .field("class_name", &self.class_name)
            .field("style", &self.style)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("alt", &self.alt)
            .field("on_load", &self.on_load.is_some())
            .field("on_mouse_move", &self.on_mouse_move.is_some())
            .field("on_mouse_leave", &self.on_mouse_leave.is_some())
            .finish()
    }
}

/// Rendered `<img>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImgElement {
    pub src: String,
    pub class_name: Option<String>,
    pub style: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub alt: String,
}

impl ImgElement {
    /// Showing the placeholder
    pub fn is_placeholder(&self) -> bool {
        self.src == PLACEHOLDER_SRC
    }

    /// Load event targeting this element
    pub fn load_event(&self) -> ImageEvent {
        ImageEvent::load(&self.src)
    }

    /// Mouse move event targeting this element
    pub fn mouse_move_event(&self, x: f64, y: f64) -> ImageEvent {
        ImageEvent::mouse_move(&self.src, x, y)
    }

    /// Mouse leave event targeting this element
    pub fn mouse_leave_event(&self) -> ImageEvent {
        ImageEvent::mouse_leave(&self.src)
    }

    /// Serialize to HTML
    pub fn to_html(&self) -> String {
        let mut out = String::from("<img");
        push_attribute(&mut out, "src", &self.src);
        if let Some(class_name) = &self.class_name {
            push_attribute(&mut out, "class", class_name);
        }
        if let Some(style) = &self.style {
            push_attribute(&mut out, "style", style);
        }
        push_attribute(&mut out, "alt", &self.alt);
        if let Some(width) = self.width {
            push_attribute(&mut out, "width", &width.to_string());
        }
        if let Some(height) = self.height {
            push_attribute(&mut out, "height", &height.to_string());
        }
        out.push('>');
        out
    }
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_attribute(value, out);
    out.push('"');
}

/// Escape attribute value
fn escape_attribute(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// WebP-aware image element
pub struct ImageWebp {
    service: CapabilityService,
    props: ImageWebpProps,
    actual_src: Option<String>,
    mounted: bool,
}

impl ImageWebp {
    pub fn new(service: CapabilityService, props: ImageWebpProps) -> Self {
        Self {
            service,
            props,
            actual_src: None,
            mounted: false,
        }
    }

    pub fn props(&self) -> &ImageWebpProps {
        &self.props
    }

    /// Replace props; the host renders and calls [`ImageWebp::update`] next
    pub fn set_props(&mut self, props: ImageWebpProps) {
        self.props = props;
    }

    /// Source chosen by the last render
    pub fn actual_src(&self) -> Option<&str> {
        self.actual_src.as_deref()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Last render showed the placeholder
    pub fn is_showing_placeholder(&self) -> bool {
        self.actual_src.as_deref() == Some(PLACEHOLDER_SRC)
    }

    /// Source the element would show for the current capability state
    pub fn select(&self) -> ActualSource<'_> {
        self.service.select(&self.props.src, self.props.src_webp.as_deref())
    }

    /// Compute the element for the current props and capability state
    pub fn render(&mut self) -> ImgElement {
        let src = self.select().url().to_string();
        self.actual_src = Some(src.clone());

        ImgElement {
            src,
            class_name: self.props.class_name.clone(),
            style: self.props.style.as_ref().filter(|s| !s.is_empty()).map(InlineStyle::to_css),
            width: self.props.width,
            height: self.props.height,
            alt: self.props.alt.clone(),
        }
    }

    /// First render is in place
    ///
    /// Returns `true` when the element is waiting on the capability probe and
    /// should be rendered again once [`ImageWebp::capability_ready`] resolves.
    pub fn mount(&mut self) -> bool {
        self.mounted = true;
        self.request_probe_if_needed()
    }

    /// A render after a prop change is in place; same contract as `mount`
    pub fn update(&mut self) -> bool {
        self.request_probe_if_needed()
    }

    fn request_probe_if_needed(&self) -> bool {
        if !self.is_showing_placeholder() {
            return false;
        }
        if self.service.initiate() {
            tracing::debug!("Element for {} started the WebP capability probe", self.props.src);
        }
        true
    }

    /// Resolves once the capability probe has settled
    pub async fn capability_ready(&self) -> CapabilityResult {
        self.service.ready().await
    }

    /// Forward an event to the matching caller handler
    ///
    /// Events fired against the placeholder are swallowed. Returns whether a
    /// handler ran.
    pub fn dispatch(&self, event: &ImageEvent) -> bool {
        if event.targets_placeholder() {
            return false;
        }
        match self.props.handler(event.event_type) {
            Some(handler) => {
                (**handler)(event);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ImageWebp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageWebp")
            .field("props", &self.props)
            .field("actual_src", &self.actual_src)
            .field("mounted", &self.mounted)
            .finish()
    }
}
