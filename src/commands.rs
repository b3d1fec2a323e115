//! # Command registry & handlers
//!
//! A small trait object per command, keyed by uppercased name. Handlers never
//! retain the capability handle they're given — it's borrowed for the
//! duration of one dispatch call.

use std::collections::HashMap;

use crate::protocol::Tokens;
use crate::ConnId;

/// What a handler is allowed to do to the rest of the server. Implemented by
/// the connection manager; handlers only see this narrow surface.
pub trait ServerCapability {
    fn send(&self, id: ConnId, text: &str);
    fn broadcast(&self, text: &str);
    fn disconnect(&self, id: ConnId);
    fn set_nick(&self, id: ConnId, nick: String);
    fn get_nick(&self, id: ConnId) -> String;
}

pub trait CommandHandler: Send + Sync {
    fn execute(&self, conn_id: ConnId, tokens: &Tokens, server: &dyn ServerCapability);
}

pub struct CommandRegistry {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Uppercase `name` and insert `handler`.
    pub fn register(&mut self, name: &str, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(name.to_uppercase(), handler);
    }

    /// Uppercase `name`, look it up, and execute. On miss, reply
    /// `"Unknown command"` to the originator only.
    pub fn dispatch(&self, name: &str, conn_id: ConnId, tokens: &Tokens, server: &dyn ServerCapability) {
        match self.handlers.get(&name.to_uppercase()) {
            Some(handler) => {
                log::debug!("dispatch {} from {:#x}", name.to_uppercase(), conn_id);
                handler.execute(conn_id, tokens, server);
            }
            None => {
                log::debug!("unknown command {:?} from {:#x}", name, conn_id);
                server.send(conn_id, "Unknown command");
            }
        }
    }

    /// Build the registry with the three built-in handlers installed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("NICK", Box::new(Nick));
        registry.register("MSG", Box::new(Msg));
        registry.register("QUIT", Box::new(Quit));
        registry
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

struct Nick;

impl CommandHandler for Nick {
    fn execute(&self, conn_id: ConnId, tokens: &Tokens, server: &dyn ServerCapability) {
        let nick = tokens.rest.clone().unwrap_or_else(|| "Anonymous".to_string());
        server.set_nick(conn_id, nick.clone());
        server.send(conn_id, &format!("Your nickname is now {}", nick));
    }
}

struct Msg;

impl CommandHandler for Msg {
    fn execute(&self, conn_id: ConnId, tokens: &Tokens, server: &dyn ServerCapability) {
        let nick = server.get_nick(conn_id);
        let payload = tokens.rest.as_deref().unwrap_or("(empty)");
        server.broadcast(&format!("{}: {}", nick, payload));
    }
}

struct Quit;

impl CommandHandler for Quit {
    fn execute(&self, conn_id: ConnId, _tokens: &Tokens, server: &dyn ServerCapability) {
        server.send(conn_id, "Goodbye!");
        server.disconnect(conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeServer {
        sent: RefCell<Vec<(ConnId, String)>>,
        broadcasts: RefCell<Vec<String>>,
        disconnected: RefCell<Vec<ConnId>>,
        nicks: RefCell<HashMap<ConnId, String>>,
    }

    impl ServerCapability for FakeServer {
        fn send(&self, id: ConnId, text: &str) {
            self.sent.borrow_mut().push((id, text.to_string()));
        }
        fn broadcast(&self, text: &str) {
            self.broadcasts.borrow_mut().push(text.to_string());
        }
        fn disconnect(&self, id: ConnId) {
            self.disconnected.borrow_mut().push(id);
        }
        fn set_nick(&self, id: ConnId, nick: String) {
            self.nicks.borrow_mut().insert(id, nick);
        }
        fn get_nick(&self, id: ConnId) -> String {
            self.nicks
                .borrow()
                .get(&id)
                .cloned()
                .unwrap_or_else(|| "Anonymous".to_string())
        }
    }

    #[test]
    fn nick_sets_and_replies() {
        let registry = CommandRegistry::with_builtins();
        let server = FakeServer::default();
        registry.dispatch("nick", 1, &Tokens::parse("NICK alice"), &server);
        assert_eq!(server.nicks.borrow().get(&1), Some(&"alice".to_string()));
        assert_eq!(server.sent.borrow()[0], (1, "Your nickname is now alice".to_string()));
    }

    #[test]
    fn nick_defaults_to_anonymous() {
        let registry = CommandRegistry::with_builtins();
        let server = FakeServer::default();
        registry.dispatch("NICK", 1, &Tokens::parse("NICK"), &server);
        assert_eq!(server.nicks.borrow().get(&1), Some(&"Anonymous".to_string()));
    }

    #[test]
    fn msg_broadcasts_with_nick() {
        let registry = CommandRegistry::with_builtins();
        let server = FakeServer::default();
        server.nicks.borrow_mut().insert(1, "alice".to_string());
        registry.dispatch("MSG", 1, &Tokens::parse("MSG hi there"), &server);
        assert_eq!(server.broadcasts.borrow()[0], "alice: hi there");
    }

    #[test]
    fn msg_defaults_to_empty_payload() {
        let registry = CommandRegistry::with_builtins();
        let server = FakeServer::default();
        registry.dispatch("MSG", 1, &Tokens::parse("MSG"), &server);
        assert_eq!(server.broadcasts.borrow()[0], "Anonymous: (empty)");
    }

    #[test]
    fn quit_sends_goodbye_then_disconnects() {
        let registry = CommandRegistry::with_builtins();
        let server = FakeServer::default();
        registry.dispatch("QUIT", 1, &Tokens::parse("QUIT"), &server);
        assert_eq!(server.sent.borrow()[0], (1, "Goodbye!".to_string()));
        assert_eq!(*server.disconnected.borrow(), vec![1]);
    }

    #[test]
    fn unknown_command_replies_privately() {
        let registry = CommandRegistry::with_builtins();
        let server = FakeServer::default();
        registry.dispatch("FOO", 1, &Tokens::parse("FOO"), &server);
        assert_eq!(server.sent.borrow()[0], (1, "Unknown command".to_string()));
    }

    #[test]
    fn command_names_are_case_insensitive() {
        let registry = CommandRegistry::with_builtins();
        let server = FakeServer::default();
        registry.dispatch("msg", 1, &Tokens::parse("msg hey"), &server);
        assert_eq!(server.broadcasts.borrow()[0], "Anonymous: hey");
    }
}
