use std::time::Duration;

use gustdb_common::CommandError;

/// Cursor sobre os tokens de uma linha de comando para extrair argumentos
/// sequencialmente. O primeiro token é o verbo, normalizado para maiúsculas.
pub struct Parse<'a> {
    verb: String,
    parts: Vec<&'a str>,
    pos: usize,
}

impl<'a> Parse<'a> {
    /// Tokeniza a linha por whitespace. Linha vazia é comando inválido.
    pub fn new(input: &'a str) -> Result<Parse<'a>, CommandError> {
        let mut tokens = input.split_whitespace();
        let verb = tokens
            .next()
            .ok_or_else(|| CommandError::InvalidCommand("empty command".into()))?
            .to_uppercase();
        Ok(Parse {
            verb,
            parts: tokens.collect(),
            pos: 0,
        })
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Retorna o próximo argumento como String.
    pub fn next_string(&mut self) -> Result<String, CommandError> {
        self.next().map(str::to_string)
    }

    /// Retorna o próximo argumento como duração em segundos (aceita frações).
    pub fn next_seconds(&mut self) -> Result<Duration, CommandError> {
        let raw = self.next()?;
        parse_seconds(raw)
    }

    /// Consome todos os argumentos restantes.
    pub fn rest(&mut self) -> Vec<String> {
        let rest = self.parts[self.pos..]
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.pos = self.parts.len();
        rest
    }

    /// Verifica se todos os argumentos foram consumidos.
    pub fn finish(&self) -> Result<(), CommandError> {
        if self.has_remaining() {
            Err(CommandError::wrong_arity(&self.verb))
        } else {
            Ok(())
        }
    }

    /// Verifica se ainda há argumentos restantes.
    pub fn has_remaining(&self) -> bool {
        self.pos < self.parts.len()
    }

    fn next(&mut self) -> Result<&'a str, CommandError> {
        let part = self
            .parts
            .get(self.pos)
            .copied()
            .ok_or_else(|| CommandError::wrong_arity(&self.verb))?;
        self.pos += 1;
        Ok(part)
    }
}

/// Converte um número decimal não negativo de segundos em `Duration`.
pub fn parse_seconds(raw: &str) -> Result<Duration, CommandError> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("'{raw}' is not a number")))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(CommandError::InvalidArgument(format!(
            "'{raw}' must be a non-negative number"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| CommandError::InvalidArgument(format!("'{raw}' is out of range")))
}
