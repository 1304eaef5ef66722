//! Command vocabulary and per-command element grammars.
//!
//! The original protocol walked one state per nested element. Here the
//! legal nesting of every command is a static table of element paths; the
//! state machine holds only the current path and checks children against
//! the owning command's table. An element name missing from the table is
//! the "bogus element" error path.

use scanmgr_types::ResourceKind;

/// One legal sub-element position within a command body.
///
/// `path` is the slash-joined element path relative to the command root,
/// e.g. `credentials/username`. `repeats` marks accumulation points that
/// may occur any number of times and are staged as groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementRule {
    pub path: &'static str,
    pub repeats: bool,
}

const fn rule(path: &'static str) -> ElementRule {
    ElementRule {
        path,
        repeats: false,
    }
}

const fn repeating(path: &'static str) -> ElementRule {
    ElementRule {
        path,
        repeats: true,
    }
}

const NO_BODY: &[ElementRule] = &[];

const AUTHENTICATE: &[ElementRule] = &[
    rule("credentials"),
    rule("credentials/username"),
    rule("credentials/password"),
];

const CREATE_AGENT: &[ElementRule] = &[
    rule("name"),
    rule("comment"),
    rule("installer"),
    rule("howto_install"),
    rule("howto_use"),
];

const CREATE_CONFIG: &[ElementRule] = &[
    rule("name"),
    rule("comment"),
    rule("copy"),
    rule("rcfile"),
];

const CREATE_ESCALATOR: &[ElementRule] = &[
    rule("name"),
    rule("comment"),
    rule("condition"),
    repeating("condition/data"),
    rule("condition/data/name"),
    rule("event"),
    repeating("event/data"),
    rule("event/data/name"),
    rule("method"),
    repeating("method/data"),
    rule("method/data/name"),
];

const CREATE_LSC_CREDENTIAL: &[ElementRule] = &[
    rule("name"),
    rule("comment"),
    rule("login"),
    rule("password"),
];

const CREATE_NOTE: &[ElementRule] = &[
    rule("nvt"),
    rule("text"),
    rule("hosts"),
    rule("port"),
    rule("threat"),
    rule("task"),
    rule("result"),
];

const CREATE_OVERRIDE: &[ElementRule] = &[
    rule("nvt"),
    rule("text"),
    rule("hosts"),
    rule("port"),
    rule("threat"),
    rule("new_threat"),
    rule("task"),
    rule("result"),
];

const CREATE_REPORT_FORMAT: &[ElementRule] = &[
    rule("name"),
    rule("summary"),
    rule("description"),
    rule("extension"),
    rule("content_type"),
    repeating("file"),
];

const CREATE_SCHEDULE: &[ElementRule] = &[
    rule("name"),
    rule("comment"),
    rule("first_time"),
    rule("first_time/minute"),
    rule("first_time/hour"),
    rule("first_time/day_of_month"),
    rule("first_time/month"),
    rule("first_time/year"),
    rule("duration"),
    rule("duration/unit"),
    rule("period"),
    rule("period/unit"),
];

const CREATE_SLAVE: &[ElementRule] = &[
    rule("name"),
    rule("comment"),
    rule("host"),
    rule("port"),
    rule("login"),
    rule("password"),
];

const CREATE_TARGET: &[ElementRule] = &[rule("name"), rule("hosts"), rule("comment")];

const CREATE_TASK: &[ElementRule] = &[
    rule("name"),
    rule("comment"),
    rule("config"),
    rule("target"),
    rule("schedule"),
    rule("slave"),
];

const MODIFY_NOTE: &[ElementRule] = &[
    rule("text"),
    rule("hosts"),
    rule("port"),
    rule("threat"),
];

const MODIFY_OVERRIDE: &[ElementRule] = &[
    rule("text"),
    rule("hosts"),
    rule("port"),
    rule("threat"),
    rule("new_threat"),
];

const MODIFY_REPORT_FORMAT: &[ElementRule] = &[
    rule("name"),
    rule("summary"),
    rule("active"),
    repeating("param"),
    rule("param/name"),
    rule("param/value"),
];

const MODIFY_TASK: &[ElementRule] = &[rule("name"), rule("comment"), rule("rcfile")];

macro_rules! commands {
    ($(($variant:ident, $name:literal, $grammar:expr)),+ $(,)?) => {
        /// Every command element the processor understands, excluding the
        /// transparent `commands` batching wrapper.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandKind {
            $($variant),+
        }

        impl CommandKind {
            /// Resolves a lowercased element name to a command.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Wire name of the command element.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }

            /// Legal sub-element positions of the command body.
            #[must_use]
            pub fn grammar(self) -> &'static [ElementRule] {
                match self {
                    $(Self::$variant => $grammar),+
                }
            }
        }

        /// Wire names of every command, used by HELP.
        pub const COMMAND_NAMES: &[&str] = &[$($name),+];
    };
}

commands![
    (Authenticate, "authenticate", AUTHENTICATE),
    (GetVersion, "get_version", NO_BODY),
    (Help, "help", NO_BODY),
    (CreateAgent, "create_agent", CREATE_AGENT),
    (CreateConfig, "create_config", CREATE_CONFIG),
    (CreateEscalator, "create_escalator", CREATE_ESCALATOR),
    (
        CreateLscCredential,
        "create_lsc_credential",
        CREATE_LSC_CREDENTIAL
    ),
    (CreateNote, "create_note", CREATE_NOTE),
    (CreateOverride, "create_override", CREATE_OVERRIDE),
    (
        CreateReportFormat,
        "create_report_format",
        CREATE_REPORT_FORMAT
    ),
    (CreateSchedule, "create_schedule", CREATE_SCHEDULE),
    (CreateSlave, "create_slave", CREATE_SLAVE),
    (CreateTarget, "create_target", CREATE_TARGET),
    (CreateTask, "create_task", CREATE_TASK),
    (DeleteAgent, "delete_agent", NO_BODY),
    (DeleteConfig, "delete_config", NO_BODY),
    (DeleteEscalator, "delete_escalator", NO_BODY),
    (DeleteLscCredential, "delete_lsc_credential", NO_BODY),
    (DeleteNote, "delete_note", NO_BODY),
    (DeleteOverride, "delete_override", NO_BODY),
    (DeleteReportFormat, "delete_report_format", NO_BODY),
    (DeleteSchedule, "delete_schedule", NO_BODY),
    (DeleteSlave, "delete_slave", NO_BODY),
    (DeleteTarget, "delete_target", NO_BODY),
    (DeleteTask, "delete_task", NO_BODY),
    (GetAgents, "get_agents", NO_BODY),
    (GetConfigs, "get_configs", NO_BODY),
    (GetEscalators, "get_escalators", NO_BODY),
    (GetLscCredentials, "get_lsc_credentials", NO_BODY),
    (GetNotes, "get_notes", NO_BODY),
    (GetOverrides, "get_overrides", NO_BODY),
    (GetReportFormats, "get_report_formats", NO_BODY),
    (GetSchedules, "get_schedules", NO_BODY),
    (GetSlaves, "get_slaves", NO_BODY),
    (GetTargets, "get_targets", NO_BODY),
    (GetTasks, "get_tasks", NO_BODY),
    (ModifyNote, "modify_note", MODIFY_NOTE),
    (ModifyOverride, "modify_override", MODIFY_OVERRIDE),
    (
        ModifyReportFormat,
        "modify_report_format",
        MODIFY_REPORT_FORMAT
    ),
    (ModifyTask, "modify_task", MODIFY_TASK),
    (StartTask, "start_task", NO_BODY),
    (PauseTask, "pause_task", NO_BODY),
    (StopTask, "stop_task", NO_BODY),
    (ResumeOrStartTask, "resume_or_start_task", NO_BODY),
    (ResumePausedTask, "resume_paused_task", NO_BODY),
    (ResumeStoppedTask, "resume_stopped_task", NO_BODY),
    (TestEscalator, "test_escalator", NO_BODY),
    (VerifyAgent, "verify_agent", NO_BODY),
    (VerifyReportFormat, "verify_report_format", NO_BODY),
];

impl CommandKind {
    /// Whether the command may run before authentication.
    #[must_use]
    pub fn allowed_pre_auth(self) -> bool {
        matches!(self, Self::Authenticate | Self::GetVersion)
    }

    /// Kind of the resource an id-referencing command addresses.
    #[must_use]
    pub fn resource(self) -> Option<ResourceKind> {
        use ResourceKind as R;
        match self {
            Self::DeleteAgent | Self::GetAgents | Self::VerifyAgent | Self::CreateAgent => {
                Some(R::Agent)
            }
            Self::DeleteConfig | Self::GetConfigs | Self::CreateConfig => Some(R::Config),
            Self::DeleteEscalator
            | Self::GetEscalators
            | Self::TestEscalator
            | Self::CreateEscalator => Some(R::Escalator),
            Self::DeleteLscCredential | Self::GetLscCredentials | Self::CreateLscCredential => {
                Some(R::LscCredential)
            }
            Self::DeleteNote | Self::GetNotes | Self::CreateNote | Self::ModifyNote => {
                Some(R::Note)
            }
            Self::DeleteOverride
            | Self::GetOverrides
            | Self::CreateOverride
            | Self::ModifyOverride => Some(R::Override),
            Self::DeleteReportFormat
            | Self::GetReportFormats
            | Self::CreateReportFormat
            | Self::ModifyReportFormat
            | Self::VerifyReportFormat => Some(R::ReportFormat),
            Self::DeleteSchedule | Self::GetSchedules | Self::CreateSchedule => Some(R::Schedule),
            Self::DeleteSlave | Self::GetSlaves | Self::CreateSlave => Some(R::Slave),
            Self::DeleteTarget | Self::GetTargets | Self::CreateTarget => Some(R::Target),
            Self::DeleteTask
            | Self::GetTasks
            | Self::CreateTask
            | Self::ModifyTask
            | Self::StartTask
            | Self::PauseTask
            | Self::StopTask
            | Self::ResumeOrStartTask
            | Self::ResumePausedTask
            | Self::ResumeStoppedTask => Some(R::Task),
            Self::Authenticate | Self::GetVersion | Self::Help => None,
        }
    }
}

/// Looks up the rule for `child` opened while `parent_path` is the
/// innermost open element (`""` at the command root).
#[must_use]
pub fn child_rule(
    grammar: &'static [ElementRule],
    parent_path: &str,
    child: &str,
) -> Option<&'static ElementRule> {
    grammar.iter().find(|rule| {
        let path = rule.path;
        if parent_path.is_empty() {
            path == child
        } else {
            path.len() == parent_path.len() + 1 + child.len()
                && path.starts_with(parent_path)
                && path.as_bytes().get(parent_path.len()) == Some(&b'/')
                && path.ends_with(child)
        }
    })
}

/// Parent path of `path` within the same command (`""` for a direct child
/// of the command root).
#[must_use]
pub fn parent_path(path: &'static str) -> &'static str {
    match path.rfind('/') {
        Some(index) => path.get(..index).unwrap_or(""),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_to_commands() {
        assert_eq!(
            CommandKind::from_name("create_target"),
            Some(CommandKind::CreateTarget)
        );
        assert_eq!(CommandKind::from_name("omp_exploit"), None);
    }

    #[test]
    fn every_command_name_round_trips() {
        for name in COMMAND_NAMES {
            let kind = CommandKind::from_name(name).expect("name resolves");
            assert_eq!(kind.name(), *name);
        }
    }

    #[test]
    fn child_rule_walks_the_grammar_tree() {
        let grammar = CommandKind::Authenticate.grammar();
        assert!(child_rule(grammar, "", "credentials").is_some());
        assert!(child_rule(grammar, "credentials", "username").is_some());
        assert!(child_rule(grammar, "", "username").is_none());
        assert!(child_rule(grammar, "credentials", "nonce").is_none());
    }

    #[test]
    fn repeated_positions_are_marked() {
        let grammar = CommandKind::CreateEscalator.grammar();
        let data = child_rule(grammar, "condition", "data").expect("data allowed");
        assert!(data.repeats);
        let name = child_rule(grammar, "condition/data", "name").expect("name allowed");
        assert!(!name.repeats);
    }

    #[test]
    fn parent_path_strips_one_component() {
        assert_eq!(parent_path("condition/data/name"), "condition/data");
        assert_eq!(parent_path("condition"), "");
    }

    #[test]
    fn only_authenticate_and_get_version_run_pre_auth() {
        for name in COMMAND_NAMES {
            let kind = CommandKind::from_name(name).expect("name resolves");
            let expected = matches!(kind, CommandKind::Authenticate | CommandKind::GetVersion);
            assert_eq!(kind.allowed_pre_auth(), expected, "{name}");
        }
    }
}
