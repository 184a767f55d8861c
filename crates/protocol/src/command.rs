use std::time::Duration;

use gustdb_common::CommandError;

use crate::Parse;

/// Condição para SET (NX ou XX).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Só seta se a chave não existir (create-only).
    Nx,
    /// Só seta se a chave já existir (update-only).
    Xx,
}

/// Opções do comando SET.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
    pub expire: Option<Duration>,
    pub condition: Option<SetCondition>,
}

/// Enum com todos os comandos suportados.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get(String),
    Set {
        key: String,
        value: String,
        options: SetOptions,
    },
    QPush {
        key: String,
        values: Vec<String>,
    },
    QPop(String),
    BQPop {
        key: String,
        timeout: Duration,
    },
}

impl Command {
    /// Faz o parse de uma linha de comando em um Command.
    pub fn parse(input: &str) -> Result<Command, CommandError> {
        let mut parse = Parse::new(input)?;
        let verb = parse.verb().to_string();

        let cmd = match verb.as_str() {
            "GET" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Get(key)
            }
            "SET" => parse_set(&mut parse)?,
            "QPUSH" => {
                let key = parse.next_string()?;
                if !parse.has_remaining() {
                    return Err(CommandError::wrong_arity("QPUSH"));
                }
                Command::QPush {
                    key,
                    values: parse.rest(),
                }
            }
            "QPOP" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::QPop(key)
            }
            "BQPOP" => {
                let key = parse.next_string()?;
                let timeout = parse.next_seconds()?;
                parse.finish()?;
                Command::BQPop { key, timeout }
            }
            other => return Err(CommandError::unknown(other)),
        };

        Ok(cmd)
    }

    /// Nome canônico do verbo, usado em logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get(_) => "GET",
            Command::Set { .. } => "SET",
            Command::QPush { .. } => "QPUSH",
            Command::QPop(_) => "QPOP",
            Command::BQPop { .. } => "BQPOP",
        }
    }

    /// Chave tocada pelo comando. Todo comando opera sobre exatamente uma chave.
    pub fn key(&self) -> &str {
        match self {
            Command::Get(key) | Command::QPop(key) => key.as_str(),
            Command::Set { key, .. } | Command::QPush { key, .. } | Command::BQPop { key, .. } => {
                key.as_str()
            }
        }
    }
}

fn parse_set(parse: &mut Parse<'_>) -> Result<Command, CommandError> {
    let key = parse.next_string()?;
    let value = parse.next_string()?;

    let mut options = SetOptions::default();

    while parse.has_remaining() {
        let opt = parse.next_string()?.to_uppercase();
        match opt.as_str() {
            "EX" => {
                if options.expire.is_some() {
                    return Err(CommandError::InvalidCommand("EX given more than once".into()));
                }
                options.expire = Some(parse.next_seconds()?);
            }
            "NX" | "XX" => {
                if options.condition.is_some() {
                    return Err(CommandError::InvalidCommand(
                        "NX and XX are mutually exclusive".into(),
                    ));
                }
                options.condition = Some(if opt == "NX" {
                    SetCondition::Nx
                } else {
                    SetCondition::Xx
                });
            }
            other => {
                return Err(CommandError::InvalidCommand(format!(
                    "unknown SET option '{other}'"
                )));
            }
        }
    }

    Ok(Command::Set {
        key,
        value,
        options,
    })
}
