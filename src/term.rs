//! Elixir Term Conversion
//!
//! Results go back as binaries and keyword lists; errors as
//! `{:error, {code, message}}` with a code atom and a string message.

use crate::error::Error;
use crate::query::{SelectStats, Selection};
use rustler::{Atom, Encoder, Env, NewBinary, Term};

rustler::atoms! {
    ok,
    error,
    live,
    peak,
    created,
    collected,
    tokens,
    materialized,
    skipped,
}

/// Convert a string to a binary term
#[inline]
pub fn str_to_binary<'a>(env: Env<'a>, s: &str) -> Term<'a> {
    let bytes = s.as_bytes();
    let mut binary = NewBinary::new(env, bytes.len());
    binary.as_mut_slice().copy_from_slice(bytes);
    binary.into()
}

/// List of binaries, built back to front
pub fn strings_to_list<'a>(env: Env<'a>, strings: &[String]) -> Term<'a> {
    let mut list = Term::list_new_empty(env);
    for s in strings.iter().rev() {
        list = list.list_prepend(str_to_binary(env, s));
    }
    list
}

/// Keyword list of buffer and driver counters
pub fn stats_to_term<'a>(env: Env<'a>, stats: &SelectStats) -> Term<'a> {
    let pairs: [(Atom, u64); 7] = [
        (live(), stats.buffer.live as u64),
        (peak(), stats.buffer.peak as u64),
        (created(), stats.buffer.created),
        (collected(), stats.buffer.collected),
        (tokens(), stats.driver.tokens),
        (materialized(), stats.driver.materialized),
        (skipped(), stats.driver.skipped),
    ];
    let mut list = Term::list_new_empty(env);
    for pair in pairs.iter().rev() {
        list = list.list_prepend(pair.encode(env));
    }
    list
}

pub fn error_to_term<'a>(env: Env<'a>, err: &Error) -> Term<'a> {
    let message = str_to_binary(env, &err.to_string());
    match Atom::from_str(env, err.code()) {
        Ok(code) => (error(), (code, message)).encode(env),
        Err(_) => (error(), message).encode(env),
    }
}

/// `{:ok, matches}` or an error tuple
pub fn selection_to_term<'a>(env: Env<'a>, result: Result<Selection, Error>) -> Term<'a> {
    match result {
        Ok(sel) => (ok(), strings_to_list(env, &sel.matches)).encode(env),
        Err(e) => error_to_term(env, &e),
    }
}

/// `{:ok, matches, stats}` or an error tuple
pub fn selection_with_stats_to_term<'a>(env: Env<'a>, result: Result<Selection, Error>) -> Term<'a> {
    match result {
        Ok(sel) => (ok(), strings_to_list(env, &sel.matches), stats_to_term(env, &sel.stats)).encode(env),
        Err(e) => error_to_term(env, &e),
    }
}
