//! Sorted-set command execution for [`MemoryStore`].
//!
//! Each handler validates its arguments the way a Redis server does and
//! answers with the same reply shapes, so the facade cannot tell the
//! in-process store from a remote one.
//!
//! ## Supported Commands
//!
//! - `ZADD key score member`
//! - `ZCARD key`
//! - `ZCOUNT key min max`
//! - `ZINCRBY key increment member`
//! - `ZRANGE key start stop [WITHSCORES]` / `ZREVRANGE ...`
//! - `ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]`
//! - `ZREVRANGEBYSCORE key max min [WITHSCORES] [LIMIT offset count]`
//! - `ZRANK key member` / `ZREVRANK key member`
//! - `ZREM key member [member ...]`
//! - `ZSCORE key member`
//! - `PING`

use crate::protocol::{format_score, RespValue};
use crate::storage::store::MemoryStore;
use crate::storage::zset::ScoreBound;
use bytes::Bytes;

const ERR_NOT_FLOAT: &str = "ERR value is not a valid float";
const ERR_NOT_INTEGER: &str = "ERR value is not an integer or out of range";
const ERR_BOUND: &str = "ERR min or max is not a float";
const ERR_SYNTAX: &str = "ERR syntax error";

/// Runs `name args...` against `database` of `store`.
pub(crate) fn execute(store: &MemoryStore, database: i64, name: &str, args: &[Bytes]) -> RespValue {
    let db = Db {
        store,
        database,
    };
    match name.to_ascii_uppercase().as_str() {
        "ZADD" => db.zadd(args),
        "ZCARD" => db.zcard(args),
        "ZCOUNT" => db.zcount(args),
        "ZINCRBY" => db.zincrby(args),
        "ZRANGE" => db.zrange(args, false),
        "ZREVRANGE" => db.zrange(args, true),
        "ZRANGEBYSCORE" => db.zrange_by_score(args, false),
        "ZREVRANGEBYSCORE" => db.zrange_by_score(args, true),
        "ZRANK" => db.zrank(args, false),
        "ZREVRANK" => db.zrank(args, true),
        "ZREM" => db.zrem(args),
        "ZSCORE" => db.zscore(args),
        "PING" => RespValue::simple_string("PONG"),
        other => RespValue::error(format!("ERR unknown command '{}'", other)),
    }
}

fn wrong_arity(name: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn text(arg: &Bytes) -> Option<&str> {
    std::str::from_utf8(arg).ok()
}

fn float(arg: &Bytes) -> Option<f64> {
    text(arg)?.parse::<f64>().ok().filter(|f| !f.is_nan())
}

fn integer(arg: &Bytes) -> Option<i64> {
    text(arg)?.parse().ok()
}

fn bound(arg: &Bytes) -> Option<ScoreBound> {
    ScoreBound::parse(text(arg)?)
}

fn with_scores(pairs: Vec<(Bytes, f64)>, include_scores: bool) -> RespValue {
    let mut items = Vec::with_capacity(pairs.len() * if include_scores { 2 } else { 1 });
    for (member, score) in pairs {
        items.push(RespValue::bulk_string(member));
        if include_scores {
            items.push(RespValue::bulk_string(format_score(score)));
        }
    }
    RespValue::array(items)
}

struct Db<'a> {
    store: &'a MemoryStore,
    database: i64,
}

impl Db<'_> {
    fn zadd(&self, args: &[Bytes]) -> RespValue {
        if args.len() < 3 || (args.len() - 1) % 2 != 0 {
            return wrong_arity("ZADD");
        }
        let key = &args[0];

        let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
        for chunk in args[1..].chunks(2) {
            match float(&chunk[0]) {
                Some(score) => pairs.push((chunk[1].clone(), score)),
                None => return RespValue::error(ERR_NOT_FLOAT),
            }
        }

        let added = self.store.update(self.database, key, |set| {
            pairs
                .into_iter()
                .filter(|(member, score)| set.insert(member.clone(), *score))
                .count()
        });
        RespValue::integer(added as i64)
    }

    fn zcard(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 1 {
            return wrong_arity("ZCARD");
        }
        let len = self
            .store
            .read(self.database, &args[0], |set| set.len())
            .unwrap_or(0);
        RespValue::integer(len as i64)
    }

    fn zcount(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 3 {
            return wrong_arity("ZCOUNT");
        }
        let (min, max) = match (bound(&args[1]), bound(&args[2])) {
            (Some(min), Some(max)) => (min, max),
            _ => return RespValue::error(ERR_BOUND),
        };
        let count = self
            .store
            .read(self.database, &args[0], |set| set.count(min, max))
            .unwrap_or(0);
        RespValue::integer(count as i64)
    }

    fn zincrby(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 3 {
            return wrong_arity("ZINCRBY");
        }
        let delta = match float(&args[1]) {
            Some(delta) => delta,
            None => return RespValue::error(ERR_NOT_FLOAT),
        };
        let member = args[2].clone();

        match self
            .store
            .update(self.database, &args[0], |set| set.increment(member, delta))
        {
            Ok(score) => RespValue::bulk_string(format_score(score)),
            Err(msg) => RespValue::error(msg),
        }
    }

    fn zrange(&self, args: &[Bytes], reverse: bool) -> RespValue {
        let name = if reverse { "ZREVRANGE" } else { "ZRANGE" };
        if args.len() != 3 && args.len() != 4 {
            return wrong_arity(name);
        }
        let (start, stop) = match (integer(&args[1]), integer(&args[2])) {
            (Some(start), Some(stop)) => (start, stop),
            _ => return RespValue::error(ERR_NOT_INTEGER),
        };
        let include_scores = match args.get(3).and_then(text) {
            None => false,
            Some(opt) if opt.eq_ignore_ascii_case("WITHSCORES") => true,
            Some(_) => return RespValue::error(ERR_SYNTAX),
        };

        let pairs = self
            .store
            .read(self.database, &args[0], |set| {
                set.range_by_rank(start, stop, reverse)
            })
            .unwrap_or_default();
        with_scores(pairs, include_scores)
    }

    fn zrange_by_score(&self, args: &[Bytes], reverse: bool) -> RespValue {
        let name = if reverse {
            "ZREVRANGEBYSCORE"
        } else {
            "ZRANGEBYSCORE"
        };
        if args.len() < 3 {
            return wrong_arity(name);
        }
        // The reverse form takes max before min.
        let (first, second) = match (bound(&args[1]), bound(&args[2])) {
            (Some(first), Some(second)) => (first, second),
            _ => return RespValue::error(ERR_BOUND),
        };
        let (min, max) = if reverse {
            (second, first)
        } else {
            (first, second)
        };

        let mut include_scores = false;
        let mut offset = 0;
        let mut count = -1;
        let mut i = 3;
        while i < args.len() {
            let opt = match text(&args[i]) {
                Some(opt) => opt.to_ascii_uppercase(),
                None => return RespValue::error(ERR_SYNTAX),
            };
            match opt.as_str() {
                "WITHSCORES" => include_scores = true,
                "LIMIT" => {
                    if i + 2 >= args.len() {
                        return RespValue::error(ERR_SYNTAX);
                    }
                    match (integer(&args[i + 1]), integer(&args[i + 2])) {
                        (Some(o), Some(c)) => {
                            offset = o;
                            count = c;
                        }
                        _ => return RespValue::error(ERR_NOT_INTEGER),
                    }
                    i += 2;
                }
                _ => return RespValue::error(ERR_SYNTAX),
            }
            i += 1;
        }

        let pairs = self
            .store
            .read(self.database, &args[0], |set| {
                set.range_by_score(min, max, reverse, offset, count)
            })
            .unwrap_or_default();
        with_scores(pairs, include_scores)
    }

    fn zrank(&self, args: &[Bytes], reverse: bool) -> RespValue {
        if args.len() != 2 {
            return wrong_arity(if reverse { "ZREVRANK" } else { "ZRANK" });
        }
        match self
            .store
            .read(self.database, &args[0], |set| set.rank(&args[1], reverse))
            .flatten()
        {
            Some(rank) => RespValue::integer(rank as i64),
            None => RespValue::null(),
        }
    }

    fn zrem(&self, args: &[Bytes]) -> RespValue {
        if args.len() < 2 {
            return wrong_arity("ZREM");
        }
        let removed = self.store.update(self.database, &args[0], |set| {
            args[1..].iter().filter(|member| set.remove(member)).count()
        });
        RespValue::integer(removed as i64)
    }

    fn zscore(&self, args: &[Bytes]) -> RespValue {
        if args.len() != 2 {
            return wrong_arity("ZSCORE");
        }
        match self
            .store
            .read(self.database, &args[0], |set| set.score(&args[1]))
            .flatten()
        {
            Some(score) => RespValue::bulk_string(format_score(score)),
            None => RespValue::null(),
        }
    }
}
