use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    chat::{
        back_markup, default_markup, ButtonAction, ButtonPress, ChatId, ChatTransport, MessageId,
        MessageRef, Outgoing, UserId,
    },
    engine::{Broadcaster, EngineEvent},
    error::{ChatError, EngineError, PipelineError, ResolveError},
    pipeline::{Pipeline, Progress, Stage, RAW_OUTPUT},
    queue::PlaybackQueue,
    request::{MaterializedTrack, Request},
    resolver::{self, SearchBackend, SearchHit},
    session::{Session, SessionState},
    util::format_duration,
};

/// Delay between creating a call explicitly and retrying the join.
const CREATE_CALL_DELAY: Duration = Duration::from_secs(3);

pub struct Config {
    /// Operator channel receiving full materialization diagnostics.
    pub log_chat: Option<ChatId>,
    pub admin_ttl: Duration,
    /// Inline buttons need the secondary bot identity to be present.
    pub has_buttons: bool,
    pub raw_output: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_chat: None,
            admin_ttl: Duration::from_secs(600),
            has_buttons: true,
            raw_output: PathBuf::from(RAW_OUTPUT),
        }
    }
}

#[derive(Clone, Debug)]
pub enum CommandKind {
    Join,
    Leave,
    Play { query: Option<String> },
    Queue,
    Skip,
    Pause,
    Resume,
    Stop,
}

/// A pre-routed user command, already stripped of its trigger syntax.
#[derive(Clone, Debug)]
pub struct Command {
    pub kind: CommandKind,
    pub origin: MessageRef,
}

enum Internal {
    Resolved {
        origin: MessageRef,
        status: Option<MessageId>,
        query: String,
        result: Result<SearchHit, ResolveError>,
    },
    Stage(Stage),
    Done(Box<Result<MaterializedTrack, PipelineError>>),
}

/// The single-writer control loop. Owns every piece of mutable state;
/// collaborators signal back in through channels, so no handler ever
/// overlaps another.
pub struct Control {
    config: Config,
    transport: Arc<dyn ChatTransport>,
    engine: Arc<dyn Broadcaster>,
    search: Arc<dyn SearchBackend>,
    pipeline: Arc<dyn Pipeline>,

    session: Session,
    queue: PlaybackQueue,
    /// Transient "Downloading/Transcoding" status message.
    status_msg: Option<MessageId>,
    /// The request currently owning the playback slot.
    current: Option<Request>,

    commands: UnboundedReceiver<Command>,
    buttons: UnboundedReceiver<ButtonPress>,
    engine_events: UnboundedReceiver<EngineEvent>,
    internal_tx: UnboundedSender<Internal>,
    internal_rx: UnboundedReceiver<Internal>,
}

impl Control {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        transport: Arc<dyn ChatTransport>,
        engine: Arc<dyn Broadcaster>,
        search: Arc<dyn SearchBackend>,
        pipeline: Arc<dyn Pipeline>,
        commands: UnboundedReceiver<Command>,
        buttons: UnboundedReceiver<ButtonPress>,
        engine_events: UnboundedReceiver<EngineEvent>,
    ) -> Self {
        let (internal_tx, internal_rx) = unbounded_channel();
        let session = Session::new(config.admin_ttl);
        Self {
            config,
            transport,
            engine,
            search,
            pipeline,
            session,
            queue: PlaybackQueue::default(),
            status_msg: None,
            current: None,
            commands,
            buttons,
            engine_events,
            internal_tx,
            internal_rx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => break,
                },
                Some(press) = self.buttons.recv() => self.on_button(press).await,
                Some(event) = self.engine_events.recv() => self.on_engine_event(event).await,
                Some(internal) = self.internal_rx.recv() => self.on_internal(internal).await,
            }
        }
    }

    pub async fn on_command(&mut self, cmd: Command) {
        let Command { kind, origin } = cmd;

        // every command deletes its trigger message after acting
        self.delete_message(origin.chat, origin.id).await;

        if matches!(kind, CommandKind::Join) {
            return self.on_join(origin).await;
        }

        if self.session.chat != Some(origin.chat) {
            self.notify(origin.chat, "`Didn't join any Voice-Call...`").await;
            return;
        }

        match kind {
            CommandKind::Join => {}
            CommandKind::Leave => self.on_leave(origin).await,
            CommandKind::Play { query } => self.on_play(origin, query).await,
            CommandKind::Queue => {
                let out = self.render_queue();
                self.notify(origin.chat, out).await;
            }
            CommandKind::Skip => self.on_skip(origin).await,
            CommandKind::Pause => {
                self.engine.pause().await;
                self.notify(origin.chat, "**Paused** Music Successfully").await;
            }
            CommandKind::Resume => {
                self.engine.resume().await;
                self.notify(origin.chat, "**Resumed** Music Successfully").await;
            }
            CommandKind::Stop => self.on_stop(origin).await,
        }
    }

    async fn on_join(&mut self, origin: MessageRef) {
        if self.session.chat.is_some() {
            let text = format!("`Already joined in {}`", self.session.chat_title);
            self.notify(origin.chat, text).await;
            return;
        }

        self.session.chat = Some(origin.chat);
        self.session.chat_title = origin.chat_title.clone();
        self.session.state = SessionState::Joining;

        if let Err(first) = self.engine.join(origin.chat).await {
            if !matches!(first, EngineError::Start(_)) {
                self.notify(origin.chat, format!("**ERROR:** `{first}`")).await;
                self.session.reset();
                return;
            }

            // no call to join yet: create one explicitly, retry once
            log::warn!("call start failed ({first}), creating the call explicitly");
            let retried = match self
                .engine
                .create_call(origin.chat, fastrand::u32(1..))
                .await
            {
                Ok(()) => {
                    tokio::time::sleep(CREATE_CALL_DELAY).await;
                    self.engine.join(origin.chat).await
                }
                Err(err) => Err(err),
            };

            if let Err(err) = retried {
                self.notify(origin.chat, format!("**ERROR:** `{err}`")).await;
                self.session.reset();
                return;
            }
        }

        self.session.state = SessionState::JoinedIdle;
    }

    /// Leaves the call but deliberately keeps pending requests: leave is
    /// "pause session", stop is "end session".
    async fn on_leave(&mut self, origin: MessageRef) {
        if let Err(err) = self.engine.leave().await {
            log::warn!("cannot leave call: {err}");
        }
        self.session.reset();
        self.notify(origin.chat, "`Left Voice-Chat Successfully`").await;
    }

    async fn on_stop(&mut self, origin: MessageRef) {
        self.advance(true).await;
        if let Err(err) = self.engine.leave().await {
            log::warn!("cannot leave call: {err}");
        }
        self.remove_raw_artifact().await;
        self.session.reset();
        self.notify(origin.chat, "`Stopped playback and cleared the Queue.`").await;
    }

    async fn on_play(&mut self, origin: MessageRef, query: Option<String>) {
        let query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        if let Some(query) = query {
            if let Some(link) = resolver::parse_video_link(&query) {
                self.accept(Request::direct_link(link, origin)).await;
                return;
            }

            // free-text search runs off the control path and rejoins
            // through the internal channel
            let status = self.reply(&origin, format!("`Searching {query}`")).await;
            let search = Arc::clone(&self.search);
            let tx = self.internal_tx.clone();
            tokio::spawn(async move {
                let result = resolver::resolve_search(search.as_ref(), &query).await;
                let _ = tx.send(Internal::Resolved {
                    origin,
                    status,
                    query,
                    result,
                });
            });
            return;
        }

        if let Some(reply) = origin.reply.clone() {
            if let Some(meta) = reply.audio.clone() {
                let requester = origin.from.clone();
                self.accept(Request::attachment(meta, *reply, requester)).await;
                return;
            }
        }

        self.reply(&origin, "`Input not found`").await;
    }

    /// Enqueue a request; start playing right away when nothing owns the
    /// playback slot, otherwise confirm its queue position.
    async fn accept(&mut self, request: Request) {
        if self.session.state.is_active() {
            let (title, link) = request.display();
            let position = self.queue.enqueue(request);
            if let Some(chat) = self.session.chat {
                let text =
                    format!("[{title}]({link}) Scheduled to QUEUE on #{position} position");
                self.notify(chat, text).await;
            }
            return;
        }

        self.queue.enqueue(request);
        self.advance(false).await;
    }

    async fn on_skip(&mut self, origin: MessageRef) {
        if !self.is_admin(origin.chat, origin.from.id).await {
            self.notify(origin.chat, "`Only Admins can Skip Song.`").await;
            return;
        }

        self.advance(false).await;
        self.notify(origin.chat, "`Skipped`").await;
    }

    pub async fn on_button(&mut self, press: ButtonPress) {
        if self.session.chat.is_none() {
            self.edit(press.chat, press.message, Outgoing::text("`Already Left Voice-Call`"))
                .await;
            return;
        }

        match press.action {
            ButtonAction::Skip => {
                if !self.is_admin(press.chat, press.from.id).await {
                    self.notify(press.chat, "`Only Admins can Skip Song.`").await;
                    return;
                }

                let text = match self.session.now_playing_link.as_deref() {
                    Some(link) if !link.is_empty() => {
                        format!("{} Skipped this [Song]({link}).", press.from.name)
                    }
                    _ => format!("{} Skipped this Song.", press.from.name),
                };

                // the control message is repurposed, do not delete it
                self.session.now_playing_msg = None;
                self.edit(press.chat, press.message, Outgoing::text(text)).await;
                self.advance(false).await;
            }

            ButtonAction::Queue => {
                let mut out = self.render_queue();
                out.push_str(&format!("\n\n**Clicked by:** {}", press.from.name));
                self.session.now_playing_msg = None;
                self.edit(
                    press.chat,
                    press.message,
                    Outgoing::text(out).markup(back_markup()),
                )
                .await;
            }

            ButtonAction::Back => {
                if self.session.now_playing_text.is_empty() {
                    self.delete_message(press.chat, press.message).await;
                    return;
                }
                self.session.now_playing_msg = Some(press.message);
                let out = Outgoing::text(self.session.now_playing_text.clone())
                    .markup(default_markup());
                self.edit(press.chat, press.message, out).await;
            }
        }
    }

    pub async fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::NetworkChanged { connected: true } => {
                if let Some(chat) = self.session.chat {
                    // a reconnect invalidates whatever was playing
                    if self.session.state == SessionState::Preparing {
                        self.session.discard_in_flight = true;
                    }
                    self.session.state = SessionState::JoinedIdle;
                    self.remove_raw_artifact().await;
                    self.notify(chat, "`Joined Voice-Chat Successfully`").await;
                }
            }

            EngineEvent::NetworkChanged { connected: false } => {
                // captured before the reset so the notification still
                // reaches the chat we were in
                let previous = self.session.chat;
                self.session.reset();
                self.remove_raw_artifact().await;
                if let Some(chat) = previous {
                    self.notify(chat, "`Left Voice-Chat Successfully`").await;
                }
            }

            EngineEvent::PlayoutEnded => {
                if self.session.chat.is_none()
                    || self.session.state == SessionState::Preparing
                {
                    return;
                }
                self.session.state = SessionState::JoinedIdle;
                self.advance(false).await;
            }
        }
    }

    async fn on_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Resolved {
                origin,
                status,
                query,
                result,
            } => self.on_resolved(origin, status, query, result).await,
            Internal::Stage(stage) => self.on_stage(stage).await,
            Internal::Done(result) => self.on_done(*result).await,
        }
    }

    async fn on_resolved(
        &mut self,
        origin: MessageRef,
        status: Option<MessageId>,
        query: String,
        result: Result<SearchHit, ResolveError>,
    ) {
        match result {
            Ok(hit) => {
                if let Some(id) = status {
                    self.delete_message(origin.chat, id).await;
                }
                if self.session.chat != Some(origin.chat) {
                    // the session moved on while the search was in flight
                    return;
                }
                self.accept(Request::searched(query, hit, origin)).await;
            }
            Err(ResolveError::NotFound) => {
                self.edit_or_notify(origin.chat, status, "`No results found.`").await;
            }
            Err(err) => {
                log::error!("search failed for {query:?}: {err}");
                self.edit_or_notify(origin.chat, status, format!("**ERROR:** `{err}`"))
                    .await;
            }
        }
    }

    async fn on_stage(&mut self, stage: Stage) {
        let Some(chat) = self.session.chat else { return };
        match stage {
            Stage::Downloading => {
                self.status_msg = self.notify(chat, "`Downloading this Song...`").await;
            }
            Stage::Transcoding => {
                if let Some(id) = self.status_msg {
                    self.edit(chat, id, Outgoing::text("`Transcoding...`")).await;
                }
            }
        }
    }

    async fn on_done(&mut self, result: Result<MaterializedTrack, PipelineError>) {
        if let Some(id) = self.status_msg.take() {
            if let Some(chat) = self.session.chat {
                self.delete_message(chat, id).await;
            }
        }

        let request = self.current.take();

        let Some(chat) = self.session.chat else {
            // stopped or disconnected while materializing; scrub the
            // artifact nobody will play
            self.remove_raw_artifact().await;
            return;
        };

        if self.session.discard_in_flight {
            // skipped past this track while it was still materializing
            self.session.discard_in_flight = false;
            self.remove_raw_artifact().await;
            self.session.state = SessionState::JoinedIdle;
            self.advance(false).await;
            return;
        }

        let track = match result {
            Ok(track) => track,
            Err(err) => {
                self.report_failure(chat, &err).await;
                self.session.state = SessionState::JoinedIdle;
                self.advance(false).await;
                return;
            }
        };

        let Some(request) = request else {
            log::error!("materialized a track without a current request");
            self.remove_raw_artifact().await;
            self.session.state = SessionState::JoinedIdle;
            return;
        };

        if let Err(err) = self.engine.set_input(&track.raw_path).await {
            log::error!("cannot hand the stream to the engine: {err}");
            self.notify(chat, format!("**ERROR:** `{err}`")).await;
            self.session.state = SessionState::JoinedIdle;
            self.advance(false).await;
            return;
        }

        self.session.state = SessionState::Playing;

        let link = request
            .link
            .clone()
            .or_else(|| request.origin.link.clone())
            .unwrap_or_default();
        let duration = track
            .duration
            .map(format_duration)
            .unwrap_or_else(|| "Unknown".into());
        let text = format!(
            "**Now playing:** [{title}]({link})\n\
             **Duration:** `{duration}`\n\
             **Requested By:** {requester}",
            title = track.title,
            requester = request.requester.name,
        );

        let mut out = Outgoing::text(&text);
        if self.config.has_buttons {
            out = out.markup(default_markup());
        }
        self.session.now_playing_msg = match self.transport.send(chat, out).await {
            Ok(id) => Some(id),
            Err(err) => {
                log::warn!("cannot send now-playing control: {err}");
                None
            }
        };
        self.session.now_playing_text = text;
        self.session.now_playing_link = Some(link);
    }

    /// The track-transition path shared by skip, stop, playout-ended and
    /// the initial play: tear down the previous slot, pop the head, start
    /// materializing it.
    async fn advance(&mut self, clear: bool) {
        self.engine.clear_input().await;

        if let Some(id) = self.session.now_playing_msg.take() {
            if let Some(chat) = self.session.chat {
                self.delete_message(chat, id).await;
            }
        }

        if clear {
            self.queue.clear();
        }

        // never overlap two materializations; the in-flight completion
        // will advance past its discarded track
        if self.session.state == SessionState::Preparing {
            self.session.discard_in_flight = true;
            return;
        }

        let Some(request) = self.queue.dequeue_next() else {
            self.current = None;
            self.session.state = if self.session.chat.is_some() {
                SessionState::JoinedIdle
            } else {
                SessionState::Idle
            };
            return;
        };

        self.begin(request).await;
    }

    async fn begin(&mut self, request: Request) {
        self.session.state = SessionState::Preparing;
        self.current = Some(request.clone());

        let pipeline = Arc::clone(&self.pipeline);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let progress = Progress::new({
                let tx = tx.clone();
                move |stage| {
                    let _ = tx.send(Internal::Stage(stage));
                }
            });
            let result = pipeline.materialize(&request, &progress).await;
            let _ = tx.send(Internal::Done(Box::new(result)));
        });
    }

    async fn is_admin(&mut self, chat: ChatId, user: UserId) -> bool {
        if let Some(admins) = self.session.admins.get(chat) {
            return admins.contains(&user);
        }

        match self.transport.admins(chat).await {
            Ok(ids) => {
                let admin = ids.contains(&user);
                self.session.admins.insert(chat, ids);
                admin
            }
            Err(err) => {
                log::warn!("cannot list chat admins: {err}");
                false
            }
        }
    }

    fn render_queue(&self) -> String {
        if self.queue.is_empty() {
            return "`Queue is empty.`".into();
        }

        let len = self.queue.len();
        let mut out = format!(
            "**{len} Song{s} in Queue:**\n",
            s = if len > 1 { "s" } else { "" },
        );
        for request in self.queue.peek_all() {
            let (title, link) = request.display();
            out.push_str(&format!("\n - [{title}]({link})"));
        }
        out
    }

    async fn report_failure(&self, chat: ChatId, err: &PipelineError) {
        log::error!("materialization failed: {err}");
        if let Some(log_chat) = self.config.log_chat {
            self.notify(log_chat, format!("`materialization failed: {err:?}`"))
                .await;
        }

        let mut out = format!("**ERROR:** `{err}`");
        if !self.queue.is_empty() {
            out.push_str("\n\n`Playing next Song.`");
        }
        self.notify(chat, out).await;
    }

    async fn remove_raw_artifact(&self) {
        match tokio::fs::remove_file(&self.config.raw_output).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("cannot remove raw artifact: {err}"),
        }
    }

    async fn notify(&self, chat: ChatId, text: impl ToString) -> Option<MessageId> {
        match self.transport.send(chat, Outgoing::text(text)).await {
            Ok(id) => Some(id),
            Err(err) => {
                log::warn!("cannot send message: {err}");
                None
            }
        }
    }

    async fn reply(&self, origin: &MessageRef, text: impl ToString) -> Option<MessageId> {
        let out = Outgoing::text(text).reply_to(origin.id);
        match self.transport.send(origin.chat, out).await {
            Ok(id) => Some(id),
            Err(err) => {
                log::warn!("cannot send reply: {err}");
                None
            }
        }
    }

    async fn edit(&self, chat: ChatId, id: MessageId, out: Outgoing) {
        if let Err(err) = self.transport.edit(chat, id, out).await {
            log::warn!("cannot edit message: {err}");
        }
    }

    async fn edit_or_notify(&self, chat: ChatId, id: Option<MessageId>, text: impl ToString) {
        match id {
            Some(id) => self.edit(chat, id, Outgoing::text(text)).await,
            None => {
                self.notify(chat, text).await;
            }
        }
    }

    async fn delete_message(&self, chat: ChatId, id: MessageId) {
        match self.transport.delete(chat, id).await {
            Ok(()) => {}
            Err(ChatError::DeleteForbidden) => {}
            Err(err) => log::warn!("cannot delete message: {err}"),
        }
    }
}
