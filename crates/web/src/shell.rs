//! Toy line-oriented shell behind the terminal socket
//!
//! Input arrives as raw keystrokes. Characters are echoed back as typed and
//! a line runs when `\r` or `\n` arrives (`\r\n` counts once).

/// Output of feeding a chunk of input
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub text: String,
    pub exit: bool,
}

pub struct Shell {
    username: String,
    host: String,
    line: String,
    after_cr: bool,
}

impl Shell {
    pub fn new(username: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            host: host.into(),
            line: String::new(),
            after_cr: false,
        }
    }

    /// Greeting and first prompt
    pub fn banner(&self) -> String {
        format!("Welcome to {}, {}\r\n{}", self.host, self.username, self.prompt())
    }

    pub fn prompt(&self) -> String {
        format!("{}@{}:~$ ", self.username, self.host)
    }

    pub fn feed(&mut self, data: &str) -> ShellOutput {
        let mut out = ShellOutput::default();

        for ch in data.chars() {
            let after_cr = std::mem::replace(&mut self.after_cr, ch == '\r');
            match ch {
                '\n' if after_cr => {}
                '\r' | '\n' => {
                    out.text.push_str("\r\n");
                    let line = std::mem::take(&mut self.line);
                    match self.run(line.trim()) {
                        Some(result) => out.text.push_str(&result),
                        None => {
                            out.text.push_str("logout\r\n");
                            out.exit = true;
                            return out;
                        }
                    }
                    out.text.push_str(&self.prompt());
                }
                '\x7f' | '\x08' => {
                    if self.line.pop().is_some() {
                        out.text.push_str("\x08 \x08");
                    }
                }
                '\x03' => {
                    self.line.clear();
                    out.text.push_str("^C\r\n");
                    out.text.push_str(&self.prompt());
                }
                c if c.is_control() => {}
                c => {
                    self.line.push(c);
                    out.text.push(c);
                }
            }
        }
        out
    }

    /// Output of one command line; `None` ends the session
    fn run(&self, line: &str) -> Option<String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Some(String::new());
        };

        let text = match command {
            "exit" | "logout" => return None,
            "ls" => "file1 file2".to_string(),
            "pwd" => format!("/home/{}", self.username),
            "whoami" => self.username.clone(),
            "hostname" => self.host.clone(),
            "echo" => words.collect::<Vec<_>>().join(" "),
            other => format!("{}: command not found", other),
        };
        Some(format!("{}\r\n", text))
    }
}
