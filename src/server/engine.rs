//! The server
//!
//! One owned value holding every table of the core: resources, programs,
//! connections, sessions, the asset cache and the server-level metrics. All
//! mutation goes through `&mut self`, driven by [`Server::handle_request`]
//! and [`Server::handle_event`].

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::config::ServerConfig;
use super::events::{Event, EventSender};
use super::http::{HttpEvent, IngestMode, Request, Response};
use super::log::MessageLog;
use super::onetime::OnetimeResources;
use super::resource::{Resource, ResourceFlags, ResourceOwner, ResourceRegistry};
use super::routes::{ism, program as program_routes, site};
use crate::error::{Error, Result};
use crate::registry::sink::FanoutSink;
use crate::ism::AssetCache;
use crate::program::entry::{RESTART_DELAY_FOLLOW_CONFIG, RESTART_DELAY_FOLLOW_FAILURE};
use crate::program::follow::{parse_stream_list, relay_stream};
use crate::program::{
    is_valid_name, Deferred, ImageFormat, PassthroughFactory, PipelineDescription, PipelineEvent,
    PipelineEventKind, PipelineFactory, PipelineSource, PipelineState, Program, ProgramKind, ProgramSet,
    ProgramState, ReqwestFetcher, StartPlan, Stream, StreamType, UpstreamEvent, UpstreamFetcher,
};
use crate::registry::{AdmissionError, ClientId, ConnectionRegistry, HandoffTarget, SinkEvent};
use crate::session::SessionStore;
use crate::stats::{Limits, Metrics};

/// Boundary of the multipart still stream
pub const STILL_BOUNDARY: &str = "fragcast";

/// Stream geometry given to pushed sources
const PUSH_WIDTH: u32 = 640;
const PUSH_HEIGHT: u32 = 360;
const PUSH_BITRATE: u64 = 600_000;

const STYLESHEET: &str = "body { font-family: sans-serif; margin: 2em; }\n\
                          ul { list-style: none; padding: 0; }\n\
                          li { margin: 0.3em 0; }\n\
                          video { background: #000; }\n";

pub struct Server {
    pub(super) config: ServerConfig,
    pub(super) limits: Limits,
    pub(super) resources: ResourceRegistry,
    pub(super) onetime: OnetimeResources,
    pub(super) programs: ProgramSet,
    pub(super) connections: ConnectionRegistry,
    pub(super) sessions: SessionStore,
    pub(super) assets: AssetCache,
    pub(super) metrics: Metrics,
    pub(super) log: MessageLog,
    deferred: VecDeque<Deferred>,
    events: EventSender,
    pipelines: Box<dyn PipelineFactory>,
    fetcher: Arc<dyn UpstreamFetcher>,
}

impl Server {
    /// Create a server. Pipelines and sinks report back on `events`.
    pub fn new(config: ServerConfig, events: EventSender) -> Self {
        let mut server = Self {
            limits: config.limits(),
            resources: ResourceRegistry::new(),
            onetime: OnetimeResources::new(config.onetime_lifetime),
            programs: ProgramSet::new(),
            connections: ConnectionRegistry::new(),
            sessions: SessionStore::new(),
            assets: AssetCache::new(config.vod_root.clone()),
            metrics: Metrics::new(),
            log: MessageLog::new(config.log_capacity),
            deferred: VecDeque::new(),
            events,
            pipelines: Box::new(PassthroughFactory::new()),
            fetcher: Arc::new(ReqwestFetcher::new()),
            config,
        };

        if let Err(e) = server.register_server_resources() {
            tracing::error!(error = %e, "Failed to register server resources");
        }
        server
    }

    /// Use `factory` for stream pipelines
    pub fn with_pipeline_factory(mut self, factory: Box<dyn PipelineFactory>) -> Self {
        self.pipelines = factory;
        self
    }

    /// Use `fetcher` for upstream stream lists
    pub fn with_fetcher(mut self, fetcher: Arc<dyn UpstreamFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    fn register_server_resources(&mut self) -> Result<()> {
        self.resources.register(
            Resource::new("/", ResourceOwner::Server)
                .flags(ResourceFlags::UI)
                .get(site::landing),
        )?;
        self.resources
            .register(Resource::new("/list", ResourceOwner::Server).get(site::program_list))?;
        self.resources.register(
            Resource::new("/log", ResourceOwner::Server)
                .flags(ResourceFlags::ADMIN)
                .get(site::log_page),
        )?;
        self.resources.register(
            Resource::new("/ism-vod/", ResourceOwner::Vod)
                .flags(ResourceFlags::PREFIX)
                .get(ism::vod),
        )?;
        self.register_static("/style.css", "text/css", Bytes::from_static(STYLESHEET.as_bytes()))
    }

    /// Serve `content` at `location` with a content-hash ETag
    pub fn register_static(&mut self, location: &str, content_type: &str, content: Bytes) -> Result<()> {
        self.resources.register(
            Resource::new(location, ResourceOwner::Server)
                .content_type(content_type)
                .static_content(content),
        )
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Apply a new configuration at runtime. Limits are recomputed and every
    /// program re-evaluates whether it should run.
    pub fn apply_config(&mut self, config: ServerConfig) {
        self.limits = config.limits();
        self.assets.set_root(config.vod_root.clone());
        self.onetime.set_lifetime(config.onetime_lifetime);
        self.log.set_capacity(config.log_capacity);
        self.config = config;

        let streaming = self.config.enable_programs;
        for program in self.programs.iter_mut() {
            if let Some(work) = program.update_state(streaming) {
                self.deferred.push_back(work);
            }
        }
        self.log.append(None, "Configuration applied");
        self.run_deferred();
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn programs(&self) -> &ProgramSet {
        &self.programs
    }

    pub fn program(&self, name: &str) -> Option<&Program> {
        self.programs.get(name)
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Append to the operational log
    pub fn append_log(&mut self, program: Option<&str>, message: &str) {
        self.log.append(program, message);
    }

    /// Open a session and return its id
    pub fn create_session(&mut self, admin: bool) -> String {
        self.sessions.create(admin)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Whether lifecycle work is waiting for [`Server::run_deferred`]
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Serve one request, then run any lifecycle work it scheduled
    pub fn handle_request(&mut self, req: Request) -> Response {
        let response = self.dispatch(req);
        self.run_deferred();
        response
    }

    /// Handle one event from the dispatch loop
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Http(event) => self.handle_http_event(event),
            Event::Pipeline(event) => self.handle_pipeline_event(event),
            Event::Sink(SinkEvent::ClientRemoved { client }) => {
                self.connections
                    .teardown(client, &mut self.programs, &mut self.metrics);
            }
            Event::Upstream(event) => self.handle_upstream_event(event),
            Event::Tick => self.tick(),
        }
        self.run_deferred();
    }

    /// Run scheduled lifecycle transitions
    pub fn run_deferred(&mut self) {
        while let Some(work) = self.deferred.pop_front() {
            match work {
                Deferred::Start(name) => self.start_program(&name),
                Deferred::FinishStop(name) => self.finish_stop(&name),
            }
        }
    }

    /// Stop every program and drop every client
    pub fn shutdown(&mut self) {
        for name in self.programs.names() {
            if let Some(program) = self.programs.get_mut(&name) {
                if program.state != ProgramState::Stopped {
                    program.state = ProgramState::Stopping;
                    self.finish_stop(&name);
                }
            }
        }
        self.connections
            .teardown_all(&mut self.programs, &mut self.metrics);
        self.deferred.clear();
        tracing::info!("Server shut down");
    }

    /// Admit `client` to `target` against the server-wide ceilings
    pub(super) fn admit(&mut self, client: ClientId, target: HandoffTarget) -> Result<()> {
        self.connections
            .admit(client, target, &mut self.programs, &mut self.metrics, &self.limits)
            .map_err(Error::from)
    }

    // Programs

    /// Add a stopped, disabled program and its resources
    pub fn add_program(&mut self, name: &str, kind: ProgramKind) -> Result<()> {
        if !is_valid_name(name) {
            return Err(Error::Config(format!("invalid program name {:?}", name)));
        }
        self.programs
            .add(Program::new(name, kind, Some(self.events.clone())))?;

        if let Err(e) = self.register_program_resources(name) {
            self.resources.remove_where(|o| o.program() == Some(name));
            self.programs.remove(name);
            return Err(e);
        }
        self.log.append(Some(name), "Program added");
        Ok(())
    }

    fn register_program_resources(&mut self, name: &str) -> Result<()> {
        let owner = ResourceOwner::Program(name.to_string());
        self.resources.register(
            Resource::new(format!("/{}", name), owner.clone())
                .flags(ResourceFlags::UI)
                .get(program_routes::page)
                .put(program_routes::ingest),
        )?;
        self.resources.register(
            Resource::new(format!("/{}.frag", name), owner.clone())
                .flags(ResourceFlags::UI)
                .get(program_routes::frag),
        )?;
        self.resources.register(
            Resource::new(format!("/{}.list", name), owner.clone())
                .content_type("text/plain")
                .get(program_routes::stream_list),
        )?;
        self.resources.register(
            Resource::new(format!("/{}-snapshot.png", name), owner.clone())
                .content_type("image/png")
                .get(program_routes::snapshot_png),
        )?;
        self.resources.register(
            Resource::new(format!("/{}-snapshot.jpeg", name), owner)
                .flags(ResourceFlags::HTTP_ONLY)
                .get(program_routes::snapshot_stream),
        )
    }

    /// Stop and remove a program with its streams and resources
    pub fn remove_program(&mut self, name: &str) -> Result<()> {
        let program = self
            .programs
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("program {}", name)))?;
        program.enabled = false;
        if program.state != ProgramState::Stopped {
            program.state = ProgramState::Stopping;
            self.finish_stop(name);
        }

        self.connections
            .teardown_program(name, &mut self.programs, &mut self.metrics);
        self.resources.remove_where(|o| o.program() == Some(name));
        if let Some(mut program) = self.programs.remove(name) {
            for stream in &mut program.streams {
                stream.shutdown();
            }
            program.still_sink.clear();
        }
        self.log.append(Some(name), "Program removed");
        Ok(())
    }

    /// Enable or disable a program. The resulting transition is deferred.
    pub fn set_program_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let streaming = self.config.enable_programs;
        let program = self
            .programs
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("program {}", name)))?;

        program.enabled = enabled;
        if let Some(work) = program.update_state(streaming) {
            self.deferred.push_back(work);
        }
        Ok(())
    }

    /// Make `name` a follow program; it (re)starts on the next tick
    pub fn configure_follow(&mut self, name: &str, kind: ProgramKind) -> Result<()> {
        if !kind.is_follow() {
            return Err(Error::Config(format!("{:?} is not a follow kind", kind)));
        }
        let program = self
            .programs
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("program {}", name)))?;

        program.kind = kind;
        program.restart_delay = RESTART_DELAY_FOLLOW_CONFIG;
        if matches!(program.state, ProgramState::Starting | ProgramState::Running) {
            let work = program.begin_stop();
            self.deferred.push_back(work);
        }
        self.log.append(Some(name), "Follow source configured");
        Ok(())
    }

    /// Register a stream on a program; launched at once if the program is up
    pub fn add_stream(
        &mut self,
        name: &str,
        stream_type: StreamType,
        width: u32,
        height: u32,
        bitrate: u64,
    ) -> Result<usize> {
        let index = self.add_stream_entry(name, |program, index| {
            Stream::new(program, index, stream_type, width, height, bitrate)
        })?;

        let up = self
            .programs
            .get(name)
            .map(|p| matches!(p.state, ProgramState::Starting | ProgramState::Running))
            .unwrap_or(false);
        if up {
            if let Err(e) = self.launch_stream(name, index) {
                self.fail_program(name, &format!("Stream {} failed to start: {}", index, e));
            }
        }
        Ok(index)
    }

    /// Append a stream and register its resources
    fn add_stream_entry(&mut self, name: &str, build: impl FnOnce(&str, usize) -> Stream) -> Result<usize> {
        let program = self
            .programs
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("program {}", name)))?;
        let index = program.push_stream(build);
        let (location, playlist, content_type) = {
            let stream = &program.streams[index];
            (
                stream.location.clone(),
                stream.playlist.clone(),
                stream.stream_type.content_type(),
            )
        };

        let owner = ResourceOwner::Stream {
            program: name.to_string(),
            index,
        };
        let registered = self
            .resources
            .register(
                Resource::new(location.clone(), owner.clone())
                    .flags(ResourceFlags::HTTP_ONLY)
                    .content_type(content_type)
                    .get(program_routes::stream),
            )
            .and_then(|_| {
                self.resources.register(
                    Resource::new(playlist, owner.clone())
                        .content_type("application/vnd.apple.mpegurl")
                        .get(program_routes::playlist),
                )
            });

        if let Err(e) = registered {
            self.resources.remove_where(|o| *o == owner);
            if let Some(program) = self.programs.get_mut(name) {
                program.streams.pop();
            }
            return Err(e);
        }
        tracing::debug!(program = %name, stream = index, location = %location, "Stream added");
        Ok(index)
    }

    /// Drop every stream of `name` with its clients and resources
    fn discard_streams(&mut self, name: &str) {
        self.connections.teardown_matching(
            |t| t.program == name && t.stream.is_some(),
            &mut self.programs,
            &mut self.metrics,
        );
        self.resources.remove_where(|o| {
            matches!(o, ResourceOwner::Stream { program, .. } if program == name)
        });
        if let Some(program) = self.programs.get_mut(name) {
            for stream in &mut program.streams {
                stream.shutdown();
            }
            program.streams.clear();
        }
    }

    // Lifecycle

    fn start_program(&mut self, name: &str) {
        let streaming = self.config.enable_programs;
        let Some(program) = self.programs.get_mut(name) else {
            return;
        };
        if program.state != ProgramState::Stopped
            || program.restart_delay > 0
            || !program.desired_run(streaming)
        {
            return;
        }

        program.state = ProgramState::Starting;
        let plan = program.kind.start_plan();
        self.log.append(Some(name), "Starting");

        match plan {
            StartPlan::Launch => self.launch_all(name),
            StartPlan::Relay { uri } => {
                self.discard_streams(name);
                match self.add_stream_entry(name, |program, index| relay_stream(program, index, &uri)) {
                    Ok(_) => self.launch_all(name),
                    Err(e) => self.fail_program(name, &format!("Failed to add follow stream: {}", e)),
                }
            }
            StartPlan::FetchList { url } => self.fetch_stream_list(name, url),
        }
    }

    /// Create and start pipelines for every stream that has none
    fn launch_all(&mut self, name: &str) {
        let count = self.programs.get(name).map(|p| p.streams.len()).unwrap_or(0);
        for index in 0..count {
            if let Err(e) = self.launch_stream(name, index) {
                self.fail_program(name, &format!("Stream {} failed to start: {}", index, e));
                return;
            }
        }
        self.check_running(name);
    }

    fn launch_stream(&mut self, name: &str, index: usize) -> Result<()> {
        let program = self
            .programs
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("program {}", name)))?;
        let push = program.kind.is_push();
        let stream = program
            .stream_mut(index)
            .ok_or_else(|| Error::not_found(format!("stream {}", index)))?;
        if stream.pipeline.is_some() {
            return Ok(());
        }

        let source = match (&stream.follow_uri, push) {
            (Some(uri), _) => PipelineSource::Follow { uri: uri.clone() },
            (None, true) => PipelineSource::Push,
            (None, false) => PipelineSource::Manual,
        };
        let description = PipelineDescription {
            program: name.to_string(),
            stream: index,
            source,
            stream_type: stream.stream_type,
            width: stream.width,
            height: stream.height,
            bitrate: stream.bitrate,
        };

        let mut pipeline = self.pipelines.create(&description, self.events.clone())?;
        pipeline.set_state(PipelineState::Playing)?;
        stream.pipeline = Some(pipeline);
        stream.playing = false;
        Ok(())
    }

    /// `Starting` becomes `Running` once every launched stream plays
    fn check_running(&mut self, name: &str) {
        let Some(program) = self.programs.get_mut(name) else {
            return;
        };
        if program.state == ProgramState::Starting && program.all_playing() {
            program.state = ProgramState::Running;
            self.log.append(Some(name), "Running");
        }
    }

    fn finish_stop(&mut self, name: &str) {
        match self.programs.get(name) {
            Some(program) if program.state == ProgramState::Stopping => {}
            _ => return,
        }

        let dropped = self
            .connections
            .teardown_program(name, &mut self.programs, &mut self.metrics);

        let Some(program) = self.programs.get_mut(name) else {
            return;
        };
        for stream in &mut program.streams {
            stream.shutdown();
        }
        program.still_sink.clear();
        program.state = ProgramState::Stopped;
        let discard = !program.kind.keeps_streams();

        if discard {
            self.discard_streams(name);
        }
        tracing::debug!(program = %name, clients = dropped, "Program stopped");
        self.log.append(Some(name), "Stopped");
    }

    /// Stop after a pipeline failure and schedule a restart per program kind
    fn fail_program(&mut self, name: &str, reason: &str) {
        let Some(program) = self.programs.get_mut(name) else {
            return;
        };
        if !matches!(program.state, ProgramState::Starting | ProgramState::Running) {
            return;
        }

        let work = program.begin_stop();
        match program.kind.restart_after_failure() {
            Some(delay) => program.restart_delay = delay,
            None => program.push_client = None,
        }
        self.deferred.push_back(work);
        self.log.append(Some(name), reason);
    }

    fn fail_follow(&mut self, name: &str, reason: &str) {
        self.fail_program(name, reason);
        if let Some(program) = self.programs.get_mut(name) {
            program.restart_delay = RESTART_DELAY_FOLLOW_FAILURE;
        }
    }

    fn fetch_stream_list(&mut self, name: &str, url: String) {
        tracing::debug!(program = %name, url = %url, "Fetching stream list");

        let program = name.to_string();
        let events = self.events.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let fetch = self.fetcher.fetch(&url);
                runtime.spawn(async move {
                    let result = fetch.await;
                    let _ = events.send(Event::Upstream(UpstreamEvent { program, result }));
                });
            }
            Err(_) => {
                let _ = events.send(Event::Upstream(UpstreamEvent {
                    program,
                    result: Err(Error::Upstream("no runtime for upstream fetch".into())),
                }));
            }
        }
    }

    fn handle_upstream_event(&mut self, event: UpstreamEvent) {
        let UpstreamEvent { program: name, result } = event;
        let host = match self.programs.get(&name) {
            Some(Program {
                state: ProgramState::Starting,
                kind: ProgramKind::PullFollow { host, .. },
                ..
            }) => host.clone(),
            _ => {
                tracing::debug!(program = %name, "Ignoring stale stream list");
                return;
            }
        };

        let body = match result {
            Ok(body) => body,
            Err(e) => {
                self.fail_follow(&name, &format!("Failed to fetch stream list: {}", e));
                return;
            }
        };

        let entries = parse_stream_list(&body);
        if entries.is_empty() {
            self.fail_follow(&name, "Upstream stream list is empty");
            return;
        }

        self.discard_streams(&name);
        let mut added_any = false;
        for entry in entries {
            let uri = format!("http://{}{}", host, entry.location);
            let added = self.add_stream_entry(&name, |program, index| {
                Stream::new(
                    program,
                    index,
                    entry.stream_type,
                    entry.width,
                    entry.height,
                    entry.bitrate,
                )
                .following(uri)
            });
            match added {
                Ok(_) => added_any = true,
                Err(e) => tracing::warn!(program = %name, error = %e, "Skipping upstream stream"),
            }
        }
        if !added_any {
            self.fail_follow(&name, "No upstream stream could be added");
            return;
        }
        self.launch_all(&name);
    }

    fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        let PipelineEvent {
            program: name,
            stream: index,
            kind,
        } = event;
        let Some(program) = self.programs.get_mut(&name) else {
            tracing::debug!(program = %name, "Event for unknown program");
            return;
        };
        if !matches!(program.state, ProgramState::Starting | ProgramState::Running) {
            tracing::debug!(program = %name, state = program.state.as_str(), "Ignoring stale pipeline event");
            return;
        }

        match kind {
            PipelineEventKind::Playing => {
                if let Some(stream) = program.stream_mut(index) {
                    stream.playing = true;
                }
                self.check_running(&name);
            }
            PipelineEventKind::Error(message) => {
                self.fail_program(&name, &format!("Stream {} error: {}", index, message));
            }
            PipelineEventKind::Eos => {
                self.fail_program(&name, &format!("Stream {} reached end of stream", index));
            }
            PipelineEventKind::Snapshot {
                format: ImageFormat::Png,
                data,
            } => program.snapshot = Some(data),
            PipelineEventKind::Snapshot {
                format: ImageFormat::Jpeg,
                data,
            } => program.still_sink.push(multipart_part("image/jpeg", &data)),
        }
    }

    fn handle_http_event(&mut self, event: HttpEvent) {
        match event {
            HttpEvent::HeadersWritten { client, socket } => {
                self.connections
                    .attach_socket(client, socket, &mut self.programs, &mut self.metrics);
            }
            HttpEvent::BodyChunk { client, data } => {
                let Some(program) = self.programs.by_push_client(client) else {
                    tracing::debug!(client = client.0, "Body from unknown source");
                    return;
                };
                let result = match program.streams.first_mut().and_then(|s| s.pipeline.as_mut()) {
                    Some(pipeline) => pipeline.push_buffer(data),
                    None => Err(Error::Disabled),
                };
                if let Err(e) = result {
                    tracing::debug!(program = %program.name, error = %e, "Dropping source data");
                }
            }
            HttpEvent::Disconnected { client } => {
                self.connections
                    .teardown(client, &mut self.programs, &mut self.metrics);

                let source_of = self
                    .programs
                    .by_push_client(client)
                    .map(|p| p.name.clone());
                if let Some(name) = source_of {
                    self.fail_program(&name, "Source disconnected");
                    if let Some(program) = self.programs.get_mut(&name) {
                        program.push_client = None;
                    }
                }
            }
        }
    }

    fn tick(&mut self) {
        let streaming = self.config.enable_programs;
        for program in self.programs.iter_mut() {
            if program.restart_delay == 0 {
                continue;
            }
            program.restart_delay -= 1;
            if program.restart_delay == 0 {
                if let Some(work) = program.update_state(streaming) {
                    self.deferred.push_back(work);
                }
            }
        }

        let expired = self.onetime.purge_expired();
        if expired > 0 {
            tracing::debug!(expired = expired, "One-time resources expired");
        }
    }

    // Ingest

    /// Accept `client` as the live source of `name`
    pub(super) fn begin_ingest(
        &mut self,
        name: &str,
        client: ClientId,
        icecast: bool,
        stream_type: StreamType,
    ) -> Result<IngestMode> {
        let streaming = self.config.enable_programs;
        let program = self
            .programs
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("program {}", name)))?;

        if !program.desired_run(streaming) {
            return Err(Error::Disabled);
        }
        if program.push_client.is_some() || program.state == ProgramState::Stopping {
            return Err(AdmissionError::SourceBusy.into());
        }

        program.kind = if icecast {
            ProgramKind::IcecastPush
        } else {
            ProgramKind::HttpPush
        };
        program.push_client = Some(client);
        program.restart_delay = 0;
        let state = program.state;

        self.discard_streams(name);
        let added = self.add_stream_entry(name, |program, index| {
            Stream::new(program, index, stream_type, PUSH_WIDTH, PUSH_HEIGHT, PUSH_BITRATE)
        });
        if let Err(e) = added {
            if let Some(program) = self.programs.get_mut(name) {
                program.push_client = None;
            }
            return Err(e);
        }

        self.log.append(Some(name), "Source connected");
        match state {
            ProgramState::Stopped => self.start_program(name),
            _ => {
                if let Some(program) = self.programs.get_mut(name) {
                    program.state = ProgramState::Starting;
                }
                self.launch_all(name);
            }
        }

        Ok(if icecast {
            IngestMode::Immediate
        } else {
            IngestMode::AtEnd
        })
    }
}

/// One part of the multipart still stream
fn multipart_part(content_type: &str, data: &[u8]) -> Bytes {
    let head = format!(
        "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        STILL_BOUNDARY,
        content_type,
        data.len()
    );
    let mut buf = BytesMut::with_capacity(head.len() + data.len() + 2);
    buf.put_slice(head.as_bytes());
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("programs", &self.programs)
            .field("connections", &self.connections.len())
            .field("metrics", &self.metrics)
            .finish()
    }
}
