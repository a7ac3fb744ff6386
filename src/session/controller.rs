use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::{
    db::{models::telemetry::sort_points, ImageFrame, MachineFilter, ScalarPoint, TelemetryKind},
    error::{ExplorerError, ExplorerResult},
    export,
    imaging::{decode_frame, DEFAULT_MAX_EDGE},
    settings::SettingsDocument,
    store::TelemetryStore,
};

use super::{
    display_names::{DisplayNameMap, TagRelabel},
    events::{ImageNavigation, ListKind, Persist, SessionEvent, StylingChange},
    render::{
        assign_series_colors, overlay_title, sample_caption, single_title, FrameContent,
        ImageView, Renderer, ScalarPlot, SeriesData, NO_IMAGES_NOTICE,
    },
    state::{filter_studies, resolve_choice, Color, PlotMode, SelectionState, SERIES_PALETTE},
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub relabel: TagRelabel,
    pub palette: Vec<Color>,
    pub image_max_edge: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            relabel: TagRelabel::default(),
            palette: SERIES_PALETTE.to_vec(),
            image_max_edge: DEFAULT_MAX_EDGE,
        }
    }
}

/// Selection values read from the settings file at startup.
///
/// Used as the second choice whenever a current selection is invalidated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedSelection {
    pub machine: Option<String>,
    pub study: Option<String>,
    pub kind: Option<TelemetryKind>,
    pub tag: Option<String>,
}

impl From<&SettingsDocument> for PersistedSelection {
    fn from(document: &SettingsDocument) -> Self {
        Self {
            machine: document.last_machine.clone(),
            study: document.last_study.clone(),
            kind: document.last_type,
            tag: document.last_tag.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct LoadedSeries {
    label: String,
    /// Position in the selection; drives the overlay colour.
    slot: usize,
    points: Vec<ScalarPoint>,
}

#[derive(Debug, Clone)]
struct LoadedScalars {
    title: String,
    overlay: bool,
    slots: usize,
    series: Vec<LoadedSeries>,
}

#[derive(Debug, Clone, Default)]
enum Loaded {
    #[default]
    Nothing,
    Scalars(LoadedScalars),
    Images(Vec<ImageFrame>),
}

/// Owns the selection state and keeps it consistent with the store.
///
/// Every change runs the cascade top to bottom: studies, then tags, then
/// data. A stage only runs when its inputs actually changed, so typing in
/// the filter box does not re-query tags or data while the selected study
/// survives the filter.
pub struct SessionController<R: Renderer> {
    store: Arc<dyn TelemetryStore>,
    renderer: R,
    options: SessionOptions,
    state: SelectionState,
    names: DisplayNameMap,
    persisted: PersistedSelection,
    loaded: Loaded,
}

impl<R: Renderer> SessionController<R> {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        renderer: R,
        options: SessionOptions,
        settings: &SettingsDocument,
    ) -> Self {
        let mut state = SelectionState::new();
        state.styling = settings.styling;
        state.layout = settings.layout.clone();

        Self {
            store,
            renderer,
            options,
            state,
            names: DisplayNameMap::default(),
            persisted: PersistedSelection::from(settings),
            loaded: Loaded::Nothing,
        }
    }

    /// Resolves the initial selection. A store failure here ends the session.
    pub async fn start(&mut self) -> ExplorerResult<()> {
        self.state.machines = self.store.list_machines().await?;

        let machine = resolve_choice(
            &self.state.machine_choices(),
            None,
            self.persisted.machine.as_deref(),
        );
        self.state.machine = machine
            .as_deref()
            .map(MachineFilter::from_label)
            .unwrap_or_default();
        self.state.kind = self.persisted.kind.unwrap_or_default();

        info!(
            "Session starting with machine {} and {} telemetry",
            self.state.machine.label(),
            self.state.kind.as_str()
        );

        self.cascade_from_studies().await
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn display_names(&self) -> &DisplayNameMap {
        &self.names
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn frames(&self) -> &[ImageFrame] {
        match &self.loaded {
            Loaded::Images(frames) => frames.as_slice(),
            _ => &[],
        }
    }

    /// Display label of the current tag.
    pub fn current_label(&self) -> Option<&str> {
        self.state
            .current_tag
            .as_deref()
            .and_then(|tag| self.names.to_display(tag))
    }

    /// One-line summary of the selection.
    pub fn status_line(&self) -> String {
        let state = &self.state;
        let mut line = format!(
            "machine={} study={} type={} tag={}",
            state.machine.label(),
            state.current_study.as_deref().unwrap_or("-"),
            state.kind.as_str(),
            self.current_label().unwrap_or("-"),
        );
        if !state.filter_text.is_empty() {
            line.push_str(&format!(" filter={:?}", state.filter_text));
        }
        if let Loaded::Scalars(loaded) = &self.loaded {
            if loaded.overlay {
                line.push_str(&format!(" overlay={}", loaded.slots));
            }
        }
        let total = self.frames().len();
        if total > 0 {
            line.push_str(&format!(" frame={}/{}", state.image_index + 1, total));
        }
        line
    }

    /// The choices for one selector, the current one marked with `*`.
    pub fn listing(&self, kind: ListKind) -> String {
        let state = &self.state;
        let (title, entries, current): (&str, Vec<String>, Option<String>) = match kind {
            ListKind::Machines => (
                "machines",
                state.machine_choices(),
                Some(state.machine.label().to_string()),
            ),
            ListKind::Studies => ("studies", state.studies.clone(), state.current_study.clone()),
            ListKind::Tags => (
                "tags",
                self.names.labels().to_vec(),
                self.current_label().map(str::to_string),
            ),
        };
        if entries.is_empty() {
            return format!("{title}: (none)");
        }
        let mut lines = vec![format!("{title}:")];
        for entry in entries {
            let marker = if current.as_deref() == Some(entry.as_str()) { '*' } else { ' ' };
            lines.push(format!("{marker} {entry}"));
        }
        lines.join("\n")
    }

    /// The persistable part of the current, fully resolved selection.
    pub fn settings_snapshot(&self) -> SettingsDocument {
        SettingsDocument {
            styling: self.state.styling,
            last_machine: Some(self.state.machine.label().to_string()),
            last_study: self.state.current_study.clone(),
            last_type: Some(self.state.kind),
            last_tag: self.state.current_tag.clone(),
            layout: self.state.layout.clone(),
        }
    }

    pub async fn handle(&mut self, event: SessionEvent) -> ExplorerResult<Persist> {
        match event {
            SessionEvent::FilterTextChanged(text) => {
                if text == self.state.filter_text {
                    return Ok(Persist::Skip);
                }
                self.state.filter_text = text;
                self.cascade_from_studies().await?;
                Ok(Persist::Debounced)
            }
            SessionEvent::MachineChanged(machine) => {
                if machine == self.state.machine {
                    return Ok(Persist::Skip);
                }
                if let Some(name) = machine.machine() {
                    if !self.state.machines.iter().any(|known| known == name) {
                        warn!("Ignoring unknown machine '{name}'");
                        return Ok(Persist::Skip);
                    }
                }
                self.state.machine = machine;
                self.cascade_from_studies().await?;
                Ok(Persist::Debounced)
            }
            SessionEvent::StudyChanged(study) => {
                if !self.state.has_study(&study) {
                    warn!("Ignoring study '{study}' outside the filtered list");
                    return Ok(Persist::Skip);
                }
                if self.state.current_study.as_deref() == Some(study.as_str()) {
                    return Ok(Persist::Skip);
                }
                self.state.current_study = Some(study);
                self.cascade_from_tags().await?;
                Ok(Persist::Debounced)
            }
            SessionEvent::TypeChanged(kind) => {
                if kind == self.state.kind {
                    return Ok(Persist::Skip);
                }
                self.state.kind = kind;
                self.cascade_from_tags().await?;
                Ok(Persist::Debounced)
            }
            SessionEvent::TagChanged(label) => {
                let Some(raw) = self.names.to_raw(&label).map(str::to_string) else {
                    warn!("Ignoring unknown tag label '{label}'");
                    return Ok(Persist::Skip);
                };
                // Re-picking the current tag still replaces an overlay on screen.
                let unchanged = self.state.current_tag.as_deref() == Some(raw.as_str())
                    && self.state.plot_mode == PlotMode::Single;
                if unchanged {
                    return Ok(Persist::Skip);
                }
                self.state.current_tag = Some(raw);
                self.state.plot_mode = PlotMode::Single;
                self.load_and_render().await?;
                Ok(Persist::Debounced)
            }
            SessionEvent::StylingChanged(change) => Ok(self.apply_styling(change)),
            SessionEvent::ListboxMultiSelectChanged(labels) => {
                self.update_multi_selection(&labels);
                Ok(Persist::Skip)
            }
            SessionEvent::PlotSelected => {
                if !self.state.can_plot_selected() {
                    debug!("Plot selected ignored: no scalar tags selected");
                    return Ok(Persist::Skip);
                }
                self.state.plot_mode = PlotMode::Overlay;
                self.load_and_render().await?;
                Ok(Persist::Skip)
            }
            SessionEvent::ImageNavigate(navigation) => {
                self.navigate(navigation);
                Ok(Persist::Skip)
            }
            SessionEvent::LayoutChanged(layout) => {
                if layout == self.state.layout {
                    return Ok(Persist::Skip);
                }
                self.state.layout = layout;
                Ok(Persist::Debounced)
            }
        }
    }

    /// Stage 1, followed by the rest of the cascade when the study moved.
    async fn cascade_from_studies(&mut self) -> ExplorerResult<()> {
        if self.resolve_studies().await? {
            self.cascade_from_tags().await?;
        }
        Ok(())
    }

    /// Recomputes the study list. Returns true when the selected study changed.
    async fn resolve_studies(&mut self) -> ExplorerResult<bool> {
        let available = self.store.list_studies(&self.state.machine).await?;
        let studies = filter_studies(&available, &self.state.filter_text);
        let resolved = resolve_choice(
            &studies,
            self.state.current_study.as_deref(),
            self.persisted.study.as_deref(),
        );
        self.state.studies = studies;

        let changed = resolved != self.state.current_study;
        if changed {
            debug!(
                "Study resolved from {:?} to {:?} ({} candidates)",
                self.state.current_study,
                resolved,
                self.state.studies.len()
            );
        }
        self.state.current_study = resolved;
        Ok(changed)
    }

    /// Stage 2: runs whenever the study or kind changed.
    async fn cascade_from_tags(&mut self) -> ExplorerResult<()> {
        self.state.multi_selected_tags.clear();
        self.state.plot_mode = PlotMode::Single;

        let Some(study) = self.state.current_study.clone() else {
            self.state.clear_tags();
            self.names = DisplayNameMap::default();
            self.unload(None);
            return Ok(());
        };

        let tags = self.store.list_tags(&study, self.state.kind).await?;
        self.names = DisplayNameMap::build(&tags, &self.options.relabel);
        self.state.current_tag = resolve_choice(
            &tags,
            self.state.current_tag.as_deref(),
            self.persisted.tag.as_deref(),
        );
        self.state.tags = tags;

        if self.state.current_tag.is_none() {
            debug!("No {} tags for {study}", self.state.kind.as_str());
            self.unload(None);
            return Ok(());
        }

        self.load_and_render().await
    }

    /// Stage 3: fetch data for the resolved selection and render it.
    async fn load_and_render(&mut self) -> ExplorerResult<()> {
        let (Some(study), Some(tag)) = (
            self.state.current_study.clone(),
            self.state.current_tag.clone(),
        ) else {
            self.unload(None);
            return Ok(());
        };

        match self.state.kind {
            TelemetryKind::Scalar => {
                let loaded = match self.state.plot_mode {
                    PlotMode::Overlay if !self.state.multi_selected_tags.is_empty() => {
                        self.load_overlay(&study).await?
                    }
                    _ => self.load_single(&study, &tag).await?,
                };
                if loaded.series.is_empty() {
                    self.unload(None);
                    return Ok(());
                }
                self.loaded = Loaded::Scalars(loaded);
                self.render_scalars();
            }
            TelemetryKind::Image => {
                let frames = self.store.image_frames(&study, &tag).await?;
                debug!("Loaded {} frames for {study}/{tag}", frames.len());
                self.state.image_index = 0;
                self.loaded = Loaded::Images(frames);
                self.render_current_frame();
            }
        }
        Ok(())
    }

    async fn load_single(&self, study: &str, tag: &str) -> ExplorerResult<LoadedScalars> {
        let label = self.label_for(tag);
        let mut points = self.store.scalar_series(study, tag).await?;
        sort_points(&mut points);

        let series = if points.is_empty() {
            Vec::new()
        } else {
            vec![LoadedSeries {
                label: label.clone(),
                slot: 0,
                points,
            }]
        };
        Ok(LoadedScalars {
            title: single_title(&label, study),
            overlay: false,
            slots: 1,
            series,
        })
    }

    async fn load_overlay(&self, study: &str) -> ExplorerResult<LoadedScalars> {
        let selected = &self.state.multi_selected_tags;
        let mut series = Vec::with_capacity(selected.len());
        for (slot, tag) in selected.iter().enumerate() {
            let mut points = self.store.scalar_series(study, tag).await?;
            if points.is_empty() {
                continue;
            }
            sort_points(&mut points);
            series.push(LoadedSeries {
                label: self.label_for(tag),
                slot,
                points,
            });
        }
        Ok(LoadedScalars {
            title: overlay_title(study),
            overlay: true,
            slots: selected.len(),
            series,
        })
    }

    fn label_for(&self, tag: &str) -> String {
        self.names
            .to_display(tag)
            .map(str::to_string)
            .unwrap_or_else(|| self.options.relabel.apply(tag))
    }

    /// The scalar plot for the loaded data under the current styling.
    pub fn current_plot(&self) -> Option<ScalarPlot> {
        let Loaded::Scalars(loaded) = &self.loaded else {
            return None;
        };
        let styling = self.state.styling;
        let colors = if loaded.overlay {
            assign_series_colors(&self.options.palette, styling.line_color, loaded.slots)
        } else {
            vec![styling.line_color; loaded.slots]
        };
        let series = loaded
            .series
            .iter()
            .map(|entry| SeriesData {
                label: entry.label.clone(),
                color: colors.get(entry.slot).copied().unwrap_or(styling.line_color),
                points: entry.points.clone(),
            })
            .collect();
        Some(ScalarPlot::new(loaded.title.clone(), series, styling))
    }

    /// The image view for the current frame, decoding it on demand.
    pub fn current_view(&self) -> Option<ImageView> {
        let frames = self.frames();
        let frame = frames.get(self.state.image_index)?;
        let content = match decode_frame(frame, self.options.image_max_edge) {
            Ok(image) => FrameContent::Decoded(image),
            Err(ExplorerError::Decode { step, message }) => {
                warn!("Could not decode frame at step {step}: {message}");
                FrameContent::Undecodable(format!("Could not load image: {message}"))
            }
            Err(other) => FrameContent::Undecodable(format!("Could not load image: {other}")),
        };
        Some(ImageView {
            frame: frame.clone(),
            content,
            position: self.state.image_index,
            total: frames.len(),
            caption: sample_caption(frame.step),
        })
    }

    fn render_scalars(&mut self) {
        if let Some(plot) = self.current_plot() {
            self.renderer.render_scalar(&plot);
        }
    }

    fn render_current_frame(&mut self) {
        match self.current_view() {
            Some(view) => self.renderer.render_image(&view),
            None => self.renderer.clear(Some(NO_IMAGES_NOTICE)),
        }
    }

    fn unload(&mut self, notice: Option<&str>) {
        self.loaded = Loaded::Nothing;
        self.state.image_index = 0;
        self.renderer.clear(notice);
    }

    fn apply_styling(&mut self, change: StylingChange) -> Persist {
        let mut styling = self.state.styling;
        match change {
            StylingChange::LogScaleY(on) => styling.log_scale_y = on,
            StylingChange::ShowMarkers(on) => styling.show_markers = on,
            StylingChange::ShowHGrid(on) => styling.show_h_grid = on,
            StylingChange::ShowVGrid(on) => styling.show_v_grid = on,
            StylingChange::GridColor(color) => {
                if !color.is_grid_color() {
                    warn!("{} is not a grid colour", color.as_str());
                    return Persist::Skip;
                }
                styling.grid_color = color;
            }
            StylingChange::LineColor(color) => {
                if !color.is_line_color() {
                    warn!("{} is not a line colour", color.as_str());
                    return Persist::Skip;
                }
                styling.line_color = color;
            }
        }
        if styling == self.state.styling {
            return Persist::Skip;
        }
        self.state.styling = styling;
        if self.state.kind == TelemetryKind::Scalar {
            self.render_scalars();
        }
        Persist::Debounced
    }

    /// Keeps earlier picks in their original order and appends new ones.
    fn update_multi_selection(&mut self, labels: &[String]) {
        if self.state.kind != TelemetryKind::Scalar {
            debug!("Multi-selection only applies to scalar tags");
            self.state.multi_selected_tags.clear();
            return;
        }
        let mut picked: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            match self.names.to_raw(label) {
                Some(raw) if !picked.iter().any(|tag| tag == raw) => picked.push(raw.to_string()),
                Some(_) => {}
                None => warn!("Ignoring unknown tag label '{label}' in selection"),
            }
        }

        let mut next: Vec<String> = self
            .state
            .multi_selected_tags
            .iter()
            .filter(|tag| picked.contains(tag))
            .cloned()
            .collect();
        for tag in picked {
            if !next.contains(&tag) {
                next.push(tag);
            }
        }
        self.state.multi_selected_tags = next;
        self.state.retain_valid_selection();
    }

    /// Moves within the loaded frames. Returns true when the frame changed.
    fn navigate(&mut self, navigation: ImageNavigation) -> bool {
        let total = self.frames().len();
        if total == 0 {
            return false;
        }
        let current = self.state.image_index;
        let last = total - 1;
        let target = match navigation {
            ImageNavigation::Prev => current.saturating_sub(1),
            ImageNavigation::Next => (current + 1).min(last),
            ImageNavigation::Seek(position) => position.clamp(0, last as i64) as usize,
        };
        if target == current {
            return false;
        }
        self.state.image_index = target;
        self.render_current_frame();
        true
    }

    /// Writes the current plot (CSV) or frame (PNG) into `dir`.
    pub fn export_snapshot(&self, dir: &Path, now: NaiveDateTime) -> anyhow::Result<PathBuf> {
        let study = self.state.current_study.as_deref().unwrap_or_default();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export directory {}", dir.display()))?;

        match self.state.kind {
            TelemetryKind::Scalar => {
                let Some(plot) = self.current_plot() else {
                    bail!("no plot to export");
                };
                let tag = if self.state.plot_mode == PlotMode::Overlay {
                    export::OVERLAY_TAG_NAME
                } else {
                    self.state.current_tag.as_deref().unwrap_or_default()
                };
                let path = dir.join(export::default_file_name(study, tag, "csv", now));
                export::write_plot_csv(&plot, &path)?;
                info!("Plot exported to {}", path.display());
                Ok(path)
            }
            TelemetryKind::Image => {
                let Some(view) = self.current_view() else {
                    bail!("no image to export");
                };
                let tag = self.state.current_tag.as_deref().unwrap_or_default();
                let path = dir.join(export::default_file_name(study, tag, "png", now));
                export::write_frame_png(&view, &path)?;
                info!("Frame exported to {}", path.display());
                Ok(path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use image::RgbaImage;

    use super::*;
    use crate::{
        imaging::encode_png,
        session::{
            render::{RecordingRenderer, RenderCall},
            state::{LayoutState, PlotStyling},
        },
        store::MemoryStore,
    };

    fn png(width: u32) -> Vec<u8> {
        encode_png(&RgbaImage::new(width, 2)).unwrap()
    }

    fn memory_store() -> MemoryStore {
        let mut store = MemoryStore::new()
            .with_scalar("alpha", "loss", "zen", &[(2, 0.5), (1, 1.0)])
            .with_scalar("alpha", "Brain/acc", "zen", &[(1, 0.1), (2, 0.2)])
            .with_scalar("alphabet", "loss", "box", &[(1, 2.0)])
            .with_scalar("beta", "loss", "box", &[(1, 3.0)])
            .with_scalar("beta", "lr", "box", &[(1, 0.01)])
            .with_image("alpha", "broken", "zen", 1, vec![1, 2, 3]);
        for step in 1..=5 {
            store = store.with_image("alpha", "samples", "zen", step * 10, png(step as u32));
        }
        store
    }

    /// Counts data queries so restyling can be shown not to hit the store.
    struct CountingStore {
        inner: MemoryStore,
        series_queries: AtomicUsize,
    }

    #[async_trait]
    impl TelemetryStore for CountingStore {
        async fn list_machines(&self) -> ExplorerResult<Vec<String>> {
            self.inner.list_machines().await
        }

        async fn list_studies(&self, filter: &MachineFilter) -> ExplorerResult<Vec<String>> {
            self.inner.list_studies(filter).await
        }

        async fn list_tags(&self, study: &str, kind: TelemetryKind) -> ExplorerResult<Vec<String>> {
            self.inner.list_tags(study, kind).await
        }

        async fn scalar_series(&self, study: &str, tag: &str) -> ExplorerResult<Vec<ScalarPoint>> {
            self.series_queries.fetch_add(1, Ordering::SeqCst);
            self.inner.scalar_series(study, tag).await
        }

        async fn image_frames(&self, study: &str, tag: &str) -> ExplorerResult<Vec<ImageFrame>> {
            self.inner.image_frames(study, tag).await
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl TelemetryStore for UnreachableStore {
        async fn list_machines(&self) -> ExplorerResult<Vec<String>> {
            Err(ExplorerError::StoreUnavailable("connection refused".into()))
        }

        async fn list_studies(&self, _filter: &MachineFilter) -> ExplorerResult<Vec<String>> {
            Err(ExplorerError::StoreUnavailable("connection refused".into()))
        }

        async fn list_tags(&self, _study: &str, _kind: TelemetryKind) -> ExplorerResult<Vec<String>> {
            Err(ExplorerError::StoreUnavailable("connection refused".into()))
        }

        async fn scalar_series(&self, _study: &str, _tag: &str) -> ExplorerResult<Vec<ScalarPoint>> {
            Err(ExplorerError::StoreUnavailable("connection refused".into()))
        }

        async fn image_frames(&self, _study: &str, _tag: &str) -> ExplorerResult<Vec<ImageFrame>> {
            Err(ExplorerError::StoreUnavailable("connection refused".into()))
        }
    }

    async fn started(settings: &SettingsDocument) -> SessionController<RecordingRenderer> {
        let mut session = SessionController::new(
            Arc::new(memory_store()),
            RecordingRenderer::new(),
            SessionOptions::default(),
            settings,
        );
        session.start().await.unwrap();
        session
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn start_resolves_the_whole_cascade() {
        let session = started(&SettingsDocument::default()).await;
        let state = session.state();
        assert_eq!(state.machine, MachineFilter::All);
        assert_eq!(state.machines, strings(&["box", "zen"]));
        assert_eq!(state.studies, strings(&["alpha", "alphabet", "beta"]));
        assert_eq!(state.current_study.as_deref(), Some("alpha"));
        assert_eq!(state.tags, strings(&["Brain/acc", "loss"]));
        assert_eq!(state.current_tag.as_deref(), Some("Brain/acc"));
        assert_eq!(session.current_label(), Some("PGC/acc"));

        let plot = session.renderer().last_plot().unwrap();
        assert_eq!(plot.title, "PGC/acc (alpha)");
        assert_eq!(plot.series.len(), 1);
        assert_eq!(plot.series[0].color, Color::Blue);
    }

    #[tokio::test]
    async fn start_fails_when_the_store_is_unreachable() {
        let mut session = SessionController::new(
            Arc::new(UnreachableStore),
            RecordingRenderer::new(),
            SessionOptions::default(),
            &SettingsDocument::default(),
        );
        let err = session.start().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn filter_keeps_a_surviving_study_without_requerying() {
        let mut session = started(&SettingsDocument::default()).await;
        let renders = session.renderer().calls.len();

        let persist = session
            .handle(SessionEvent::FilterTextChanged("alp".into()))
            .await
            .unwrap();
        assert_eq!(persist, Persist::Debounced);
        assert_eq!(session.state().studies, strings(&["alpha", "alphabet"]));
        assert_eq!(session.state().current_study.as_deref(), Some("alpha"));
        assert_eq!(session.renderer().calls.len(), renders);
    }

    #[tokio::test]
    async fn filter_falls_back_to_the_first_match() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::FilterTextChanged("be".into()))
            .await
            .unwrap();
        let state = session.state();
        assert_eq!(state.studies, strings(&["alphabet", "beta"]));
        assert_eq!(state.current_study.as_deref(), Some("alphabet"));
        assert_eq!(state.current_tag.as_deref(), Some("loss"));
        assert_eq!(
            session.renderer().last_plot().unwrap().title,
            "loss (alphabet)"
        );
    }

    #[tokio::test]
    async fn filter_prefers_the_persisted_study() {
        let settings = SettingsDocument {
            last_study: Some("beta".into()),
            ..SettingsDocument::default()
        };
        let mut session = started(&settings).await;
        assert_eq!(session.state().current_study.as_deref(), Some("beta"));

        session
            .handle(SessionEvent::FilterTextChanged("zzz".into()))
            .await
            .unwrap();
        session
            .handle(SessionEvent::FilterTextChanged("a".into()))
            .await
            .unwrap();
        assert_eq!(session.state().current_study.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn empty_filter_result_clears_everything_downstream() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::FilterTextChanged("zzz".into()))
            .await
            .unwrap();
        let state = session.state();
        assert!(state.studies.is_empty());
        assert_eq!(state.current_study, None);
        assert!(state.tags.is_empty());
        assert_eq!(state.current_tag, None);
        assert!(session.display_names().is_empty());
        assert_eq!(session.renderer().last(), Some(&RenderCall::Clear(None)));
    }

    #[tokio::test]
    async fn machine_change_restricts_studies() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::MachineChanged(MachineFilter::Named("box".into())))
            .await
            .unwrap();
        assert_eq!(session.state().studies, strings(&["alphabet", "beta"]));
        assert_eq!(session.state().current_study.as_deref(), Some("alphabet"));

        let persist = session
            .handle(SessionEvent::MachineChanged(MachineFilter::Named("nope".into())))
            .await
            .unwrap();
        assert_eq!(persist, Persist::Skip);
        assert_eq!(session.state().machine.label(), "box");
    }

    #[tokio::test]
    async fn listings_mark_the_current_choice() {
        let mut session = started(&SettingsDocument::default()).await;
        assert_eq!(
            session.listing(ListKind::Machines),
            "machines:\n* All\n  box\n  zen"
        );
        assert_eq!(
            session.listing(ListKind::Studies),
            "studies:\n* alpha\n  alphabet\n  beta"
        );
        assert_eq!(session.listing(ListKind::Tags), "tags:\n* PGC/acc\n  loss");

        session
            .handle(SessionEvent::FilterTextChanged("zzz".into()))
            .await
            .unwrap();
        assert_eq!(session.listing(ListKind::Studies), "studies: (none)");
        assert_eq!(session.listing(ListKind::Tags), "tags: (none)");
    }

    #[tokio::test]
    async fn tag_labels_map_back_to_raw_tags() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::TagChanged("loss".into()))
            .await
            .unwrap();
        assert_eq!(session.state().current_tag.as_deref(), Some("loss"));

        session
            .handle(SessionEvent::TagChanged("PGC/acc".into()))
            .await
            .unwrap();
        assert_eq!(session.state().current_tag.as_deref(), Some("Brain/acc"));

        let persist = session
            .handle(SessionEvent::TagChanged("Brain/acc".into()))
            .await
            .unwrap();
        assert_eq!(persist, Persist::Skip);
    }

    #[tokio::test]
    async fn plot_selected_overlays_in_selection_order() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::ListboxMultiSelectChanged(strings(&["loss", "PGC/acc"])))
            .await
            .unwrap();
        assert_eq!(
            session.state().multi_selected_tags,
            strings(&["loss", "Brain/acc"])
        );

        session.handle(SessionEvent::PlotSelected).await.unwrap();
        assert_eq!(session.state().plot_mode, PlotMode::Overlay);
        let plot = session.renderer().last_plot().unwrap();
        assert_eq!(plot.title, "Multiple Tags (alpha)");
        let labels: Vec<&str> = plot.series.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["loss", "PGC/acc"]);
        let colors: Vec<Color> = plot.series.iter().map(|s| s.color).collect();
        assert_eq!(colors, vec![Color::Blue, Color::Red]);
        assert_eq!(plot.series[0].points[0].step, 1);
    }

    #[tokio::test]
    async fn current_tag_replaces_an_overlay_after_the_selection_is_emptied() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::ListboxMultiSelectChanged(strings(&["loss", "PGC/acc"])))
            .await
            .unwrap();
        session.handle(SessionEvent::PlotSelected).await.unwrap();
        session
            .handle(SessionEvent::ListboxMultiSelectChanged(Vec::new()))
            .await
            .unwrap();

        // The overlay is still on screen.
        assert_eq!(session.state().plot_mode, PlotMode::Overlay);
        assert!(session.status_line().ends_with(" overlay=2"));

        let persist = session
            .handle(SessionEvent::TagChanged("PGC/acc".into()))
            .await
            .unwrap();
        assert_eq!(persist, Persist::Debounced);
        assert_eq!(session.state().plot_mode, PlotMode::Single);
        let plot = session.renderer().last_plot().unwrap();
        assert_eq!(plot.title, "PGC/acc (alpha)");
        assert_eq!(plot.series.len(), 1);

        session
            .handle(SessionEvent::StylingChanged(StylingChange::LogScaleY(true)))
            .await
            .unwrap();
        let plot = session.renderer().last_plot().unwrap();
        assert_eq!(plot.title, "PGC/acc (alpha)");
        assert_eq!(plot.series.len(), 1);
        assert!(!session.status_line().contains("overlay"));
    }

    #[tokio::test]
    async fn plot_selected_needs_a_selection() {
        let mut session = started(&SettingsDocument::default()).await;
        let renders = session.renderer().calls.len();
        let persist = session.handle(SessionEvent::PlotSelected).await.unwrap();
        assert_eq!(persist, Persist::Skip);
        assert_eq!(session.state().plot_mode, PlotMode::Single);
        assert_eq!(session.renderer().calls.len(), renders);
    }

    #[tokio::test]
    async fn styling_rerenders_loaded_data_without_a_query() {
        let store = Arc::new(CountingStore {
            inner: memory_store(),
            series_queries: AtomicUsize::new(0),
        });
        let mut session = SessionController::new(
            store.clone(),
            RecordingRenderer::new(),
            SessionOptions::default(),
            &SettingsDocument::default(),
        );
        session.start().await.unwrap();
        session
            .handle(SessionEvent::ListboxMultiSelectChanged(strings(&["PGC/acc", "loss"])))
            .await
            .unwrap();
        session.handle(SessionEvent::PlotSelected).await.unwrap();
        let queries = store.series_queries.load(Ordering::SeqCst);

        let persist = session
            .handle(SessionEvent::StylingChanged(StylingChange::LineColor(Color::Red)))
            .await
            .unwrap();
        assert_eq!(persist, Persist::Debounced);
        assert_eq!(store.series_queries.load(Ordering::SeqCst), queries);

        let plot = session.renderer().last_plot().unwrap();
        assert_eq!(plot.title, "Multiple Tags (alpha)");
        let colors: Vec<Color> = plot.series.iter().map(|s| s.color).collect();
        assert_eq!(colors, vec![Color::Red, Color::Green]);
        assert_eq!(plot.styling.line_color, Color::Red);
    }

    #[tokio::test]
    async fn invalid_or_repeated_styling_is_ignored() {
        let mut session = started(&SettingsDocument::default()).await;
        let grid = session
            .handle(SessionEvent::StylingChanged(StylingChange::GridColor(Color::Purple)))
            .await
            .unwrap();
        assert_eq!(grid, Persist::Skip);
        assert_eq!(session.state().styling.grid_color, Color::Gray);

        let markers = session
            .handle(SessionEvent::StylingChanged(StylingChange::ShowMarkers(true)))
            .await
            .unwrap();
        assert_eq!(markers, Persist::Skip);
    }

    #[tokio::test]
    async fn image_navigation_clamps_to_the_loaded_frames() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::TypeChanged(TelemetryKind::Image))
            .await
            .unwrap();
        session
            .handle(SessionEvent::TagChanged("samples".into()))
            .await
            .unwrap();
        assert_eq!(session.frames().len(), 5);
        assert_eq!(session.state().image_index, 0);
        let view = session.renderer().last_view().unwrap();
        assert_eq!(view.caption, "Sample ID: 10");
        assert!(!view.has_prev());
        assert!(view.has_next());

        let renders = session.renderer().calls.len();
        session
            .handle(SessionEvent::ImageNavigate(ImageNavigation::Prev))
            .await
            .unwrap();
        assert_eq!(session.state().image_index, 0);
        assert_eq!(session.renderer().calls.len(), renders);

        let persist = session
            .handle(SessionEvent::ImageNavigate(ImageNavigation::Seek(10)))
            .await
            .unwrap();
        assert_eq!(persist, Persist::Skip);
        assert_eq!(session.state().image_index, 4);

        session
            .handle(SessionEvent::ImageNavigate(ImageNavigation::Next))
            .await
            .unwrap();
        assert_eq!(session.state().image_index, 4);

        session
            .handle(SessionEvent::ImageNavigate(ImageNavigation::Seek(-3)))
            .await
            .unwrap();
        assert_eq!(session.state().image_index, 0);

        let view = session.renderer().last_view().unwrap();
        match &view.content {
            FrameContent::Decoded(image) => assert_eq!(image.dimensions(), (1, 2)),
            other => panic!("expected a decoded frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_frames_show_a_placeholder() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::TypeChanged(TelemetryKind::Image))
            .await
            .unwrap();
        assert_eq!(session.state().current_tag.as_deref(), Some("broken"));
        let view = session.renderer().last_view().unwrap();
        match &view.content {
            FrameContent::Undecodable(text) => assert!(text.starts_with("Could not load image: ")),
            other => panic!("expected a placeholder, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn studies_without_images_clear_the_surface() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::StudyChanged("beta".into()))
            .await
            .unwrap();
        session
            .handle(SessionEvent::TypeChanged(TelemetryKind::Image))
            .await
            .unwrap();
        assert!(session.state().tags.is_empty());
        assert!(session.frames().is_empty());
        assert_eq!(session.renderer().last(), Some(&RenderCall::Clear(None)));
    }

    #[tokio::test]
    async fn kind_change_drops_the_multi_selection() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::ListboxMultiSelectChanged(strings(&["loss"])))
            .await
            .unwrap();
        session
            .handle(SessionEvent::TypeChanged(TelemetryKind::Image))
            .await
            .unwrap();
        assert!(session.state().multi_selected_tags.is_empty());
        assert!(!session.state().can_plot_selected());
    }

    #[tokio::test]
    async fn layout_changes_are_persisted_once() {
        let mut session = started(&SettingsDocument::default()).await;
        let layout = LayoutState {
            window_geometry: Some("1200x800+0+0".into()),
            pane_sash_position: Some(300),
        };
        let first = session
            .handle(SessionEvent::LayoutChanged(layout.clone()))
            .await
            .unwrap();
        let second = session
            .handle(SessionEvent::LayoutChanged(layout.clone()))
            .await
            .unwrap();
        assert_eq!(first, Persist::Debounced);
        assert_eq!(second, Persist::Skip);
        assert_eq!(session.settings_snapshot().layout, layout);
    }

    #[tokio::test]
    async fn snapshot_restores_the_same_selection() {
        let mut session = started(&SettingsDocument::default()).await;
        session
            .handle(SessionEvent::MachineChanged(MachineFilter::Named("zen".into())))
            .await
            .unwrap();
        session
            .handle(SessionEvent::TagChanged("loss".into()))
            .await
            .unwrap();
        session
            .handle(SessionEvent::StylingChanged(StylingChange::LogScaleY(true)))
            .await
            .unwrap();

        let snapshot = session.settings_snapshot();
        assert_eq!(snapshot.last_machine.as_deref(), Some("zen"));
        assert_eq!(snapshot.last_study.as_deref(), Some("alpha"));
        assert_eq!(snapshot.last_type, Some(TelemetryKind::Scalar));
        assert_eq!(snapshot.last_tag.as_deref(), Some("loss"));

        let restored = started(&snapshot).await;
        let state = restored.state();
        assert_eq!(state.machine, MachineFilter::Named("zen".into()));
        assert_eq!(state.current_study.as_deref(), Some("alpha"));
        assert_eq!(state.kind, TelemetryKind::Scalar);
        assert_eq!(state.current_tag.as_deref(), Some("loss"));
        assert_eq!(
            state.styling,
            PlotStyling {
                log_scale_y: true,
                ..PlotStyling::default()
            }
        );
        assert!(restored.renderer().last_plot().unwrap().styling.log_scale_y);
    }

    #[tokio::test]
    async fn export_writes_the_current_plot() {
        let dir = tempfile::tempdir().unwrap();
        let session = started(&SettingsDocument::default()).await;
        let now = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(13, 4, 5)
            .unwrap();

        let path = session.export_snapshot(dir.path(), now).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "alpha_Brain_acc_20240501_130405.csv"
        );
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents, "series,step,value\nPGC/acc,1,0.1\nPGC/acc,2,0.2\n");
    }
}
