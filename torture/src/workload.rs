//! One workload iteration: a fresh flag, a crowd of participants released at once, and a check of
//! every guarantee the flag makes once they are all back.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Instant,
};

use anyhow::Result;
use concurrent_flag::{Done, Flag};
use crossbeam_channel::{after, select, Receiver, RecvTimeoutError, Sender};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use threadpool::ThreadPool;
use tracing::{debug, trace};

use crate::{cli::WorkloadParams, panic::panic_to_string};

/// A broken guarantee observed during an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// More than one `try_set` reported performing the transition.
    DoubleTransition(usize),
    /// No `try_set` reported performing the transition.
    NoTransition,
    /// A participant read the flag as unset after it must have been set.
    StaleRead { participant: usize },
    /// A waiter was still blocked when the wait timeout elapsed.
    MissedWakeup { participant: usize },
    /// A waiter was released before any setter started.
    PrematureWakeup { participant: usize },
    /// A participant panicked.
    Panic(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DoubleTransition(n) => write!(f, "flag transitioned {} times", n),
            Violation::NoTransition => write!(f, "flag never transitioned"),
            Violation::StaleRead { participant } => {
                write!(f, "participant {} read a set flag as unset", participant)
            }
            Violation::MissedWakeup { participant } => {
                write!(f, "waiter {} was never released", participant)
            }
            Violation::PrematureWakeup { participant } => {
                write!(f, "waiter {} was released before any set", participant)
            }
            Violation::Panic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Violation {}

#[derive(Debug, Clone, Copy)]
enum Role {
    Setter,
    Poller,
    Waiter,
}

/// What a participant reports back when it is done.
#[derive(Debug)]
enum Report {
    Setter { won: bool, stale: bool },
    Poller { stale: bool },
    Waiter {
        released: bool,
        premature: bool,
        stale: bool,
    },
}

/// The state shared by all participants of one iteration.
struct Round {
    flag: Flag,
    start: Barrier,
    /// Number of setters that have entered `try_set`.
    entered: AtomicUsize,
}

pub struct Workload {
    params: WorkloadParams,
    tp: ThreadPool,
    rng: rand_pcg::Pcg64,
}

impl Workload {
    pub fn new(seed: u64, params: WorkloadParams) -> Self {
        // Every participant blocks on the start barrier, so each needs its own thread.
        let tp = ThreadPool::with_name("flag-torture".into(), params.participants());
        Self {
            params,
            tp,
            rng: rand_pcg::Pcg64::seed_from_u64(seed),
        }
    }

    /// Runs a single iteration.
    ///
    /// Returns `Err` only when the harness itself failed. A broken flag guarantee is returned as
    /// `Ok(Err(violation))`.
    pub fn run_iteration(&mut self, iteration: usize) -> Result<Result<(), Violation>> {
        let participants = self.params.participants();
        let round = Arc::new(Round {
            flag: Flag::new(),
            start: Barrier::new(participants),
            entered: AtomicUsize::new(0),
        });
        let (tx, rx) = crossbeam_channel::unbounded();

        let roles = self.shuffled_roles();
        for (participant, role) in roles.into_iter().enumerate() {
            // Half of the waiters take their handle before the race starts.
            let early_done = match role {
                Role::Waiter if self.rng.gen_bool(0.5) => Some(round.flag.done()),
                _ => None,
            };
            spawn_participant(
                &self.tp,
                Participant {
                    index: participant,
                    role,
                    round: round.clone(),
                    early_done,
                    jitter: self.rng.gen_range(0..16),
                    wait_timeout: self.params.wait_timeout,
                },
                tx.clone(),
            );
        }
        drop(tx);

        let reports = collect_reports(&rx, participants, self.params.wait_timeout)?;
        let verdict = check(&reports);
        debug!(iteration, participants, ok = verdict.is_ok(), "iteration finished");
        Ok(verdict)
    }

    fn shuffled_roles(&mut self) -> Vec<Role> {
        let mut roles = Vec::with_capacity(self.params.participants());
        roles.extend((0..self.params.setters).map(|_| Role::Setter));
        roles.extend((0..self.params.pollers).map(|_| Role::Poller));
        roles.extend((0..self.params.waiters).map(|_| Role::Waiter));
        // So that thread spawn order does not line up with roles.
        roles.shuffle(&mut self.rng);
        roles
    }
}

struct Participant {
    index: usize,
    role: Role,
    round: Arc<Round>,
    early_done: Option<Done>,
    jitter: u32,
    wait_timeout: std::time::Duration,
}

type ParticipantResult = thread::Result<Report>;

fn spawn_participant(tp: &ThreadPool, p: Participant, tx: Sender<(usize, ParticipantResult)>) {
    tp.execute(move || {
        let index = p.index;
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| p.run()));
        let _ = tx.send((index, res));
    });
}

impl Participant {
    fn run(self) -> Report {
        self.round.start.wait();
        for _ in 0..self.jitter {
            thread::yield_now();
        }
        let flag = &self.round.flag;
        match self.role {
            Role::Setter => {
                self.round.entered.fetch_add(1, Ordering::SeqCst);
                let won = flag.try_set();
                if won {
                    trace!(participant = self.index, "won the race to set");
                }
                Report::Setter {
                    won,
                    stale: !flag.is_set(),
                }
            }
            Role::Poller => {
                let deadline = Instant::now() + self.wait_timeout;
                while !flag.is_set() && Instant::now() < deadline {
                    thread::yield_now();
                }
                Report::Poller {
                    stale: !flag.is_set() || !flag.done().is_ready(),
                }
            }
            Role::Waiter => {
                let done = self.early_done.unwrap_or_else(|| flag.done());
                let released = select! {
                    recv(done.receiver()) -> _ => true,
                    recv(after(self.wait_timeout)) -> _ => false,
                };
                let premature = released && self.round.entered.load(Ordering::SeqCst) == 0;
                Report::Waiter {
                    released,
                    premature,
                    stale: released && !flag.is_set(),
                }
            }
        }
    }
}

fn collect_reports(
    rx: &Receiver<(usize, ParticipantResult)>,
    participants: usize,
    wait_timeout: std::time::Duration,
) -> Result<Vec<(usize, ParticipantResult)>> {
    // Waiters and pollers give up after `wait_timeout`, so everyone should be back well before
    // twice that.
    let deadline = Instant::now() + wait_timeout * 2;
    let mut reports = Vec::with_capacity(participants);
    while reports.len() < participants {
        match rx.recv_deadline(deadline) {
            Ok(report) => reports.push(report),
            Err(RecvTimeoutError::Timeout) => anyhow::bail!(
                "{} of {} participants did not report back",
                participants - reports.len(),
                participants
            ),
            Err(RecvTimeoutError::Disconnected) => anyhow::bail!(
                "participants exited without reporting ({} of {} reported)",
                reports.len(),
                participants
            ),
        }
    }
    Ok(reports)
}

fn check(reports: &[(usize, ParticipantResult)]) -> Result<(), Violation> {
    let mut winners = 0;
    for (participant, res) in reports {
        let participant = *participant;
        let report = match res {
            Ok(report) => report,
            Err(payload) => {
                let context = format!("participant {} panicked", participant);
                return Err(Violation::Panic(panic_to_string(&context, payload.as_ref())));
            }
        };
        match *report {
            Report::Setter { won, stale } => {
                winners += won as usize;
                if stale {
                    return Err(Violation::StaleRead { participant });
                }
            }
            Report::Poller { stale } => {
                if stale {
                    return Err(Violation::StaleRead { participant });
                }
            }
            Report::Waiter { stale: true, .. } => {
                return Err(Violation::StaleRead { participant })
            }
            Report::Waiter { premature: true, .. } => {
                return Err(Violation::PrematureWakeup { participant })
            }
            Report::Waiter {
                released: false, ..
            } => return Err(Violation::MissedWakeup { participant }),
            Report::Waiter { .. } => {}
        }
    }
    match winners {
        0 => Err(Violation::NoTransition),
        1 => Ok(()),
        n => Err(Violation::DoubleTransition(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params(setters: u32, pollers: u32, waiters: u32) -> WorkloadParams {
        WorkloadParams {
            iterations: 1,
            setters,
            pollers,
            waiters,
            wait_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn healthy_flag_passes() {
        let mut workload = Workload::new(7, params(32, 4, 8));
        for iteration in 0..3 {
            assert_eq!(workload.run_iteration(iteration).unwrap(), Ok(()));
        }
    }

    #[test]
    fn single_setter_passes() {
        let mut workload = Workload::new(0, params(1, 0, 0));
        assert_eq!(workload.run_iteration(0).unwrap(), Ok(()));
    }

    #[test]
    fn shuffle_is_seeded() {
        let a = Workload::new(11, params(8, 8, 8)).shuffled_roles();
        let b = Workload::new(11, params(8, 8, 8)).shuffled_roles();
        let kinds = |roles: &[Role]| roles.iter().map(|r| *r as u8).collect::<Vec<_>>();
        assert_eq!(kinds(&a), kinds(&b));
    }

    #[test]
    fn roles_are_a_permutation() {
        let mut workload = Workload::new(3, params(5, 2, 3));
        let roles = workload.shuffled_roles();
        assert_eq!(roles.len(), 10);
        assert_eq!(roles.iter().filter(|r| matches!(r, Role::Setter)).count(), 5);
        assert_eq!(roles.iter().filter(|r| matches!(r, Role::Poller)).count(), 2);
        assert_eq!(roles.iter().filter(|r| matches!(r, Role::Waiter)).count(), 3);
    }

    #[test]
    fn check_flags_double_transition() {
        let reports: Vec<(usize, ParticipantResult)> = vec![
            (0, Ok(Report::Setter { won: true, stale: false })),
            (1, Ok(Report::Setter { won: true, stale: false })),
        ];
        assert_eq!(check(&reports), Err(Violation::DoubleTransition(2)));
    }

    #[test]
    fn check_flags_missing_transition() {
        let reports: Vec<(usize, ParticipantResult)> =
            vec![(0, Ok(Report::Setter { won: false, stale: false }))];
        assert_eq!(check(&reports), Err(Violation::NoTransition));
    }

    #[test]
    fn check_flags_waiter_problems() {
        let winner = (0, Ok(Report::Setter { won: true, stale: false }));

        let reports: Vec<(usize, ParticipantResult)> = vec![
            winner,
            (
                1,
                Ok(Report::Waiter {
                    released: false,
                    premature: false,
                    stale: false,
                }),
            ),
        ];
        assert_eq!(
            check(&reports),
            Err(Violation::MissedWakeup { participant: 1 })
        );

        let reports: Vec<(usize, ParticipantResult)> = vec![(
            2,
            Ok(Report::Waiter {
                released: true,
                premature: true,
                stale: false,
            }),
        )];
        assert_eq!(
            check(&reports),
            Err(Violation::PrematureWakeup { participant: 2 })
        );
    }

    #[test]
    fn check_flags_stale_poll() {
        let reports: Vec<(usize, ParticipantResult)> = vec![
            (0, Ok(Report::Setter { won: true, stale: false })),
            (5, Ok(Report::Poller { stale: true })),
        ];
        assert_eq!(check(&reports), Err(Violation::StaleRead { participant: 5 }));
    }

    #[test]
    fn check_reports_panics() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        let reports: Vec<(usize, ParticipantResult)> = vec![(3, Err(payload))];
        assert_eq!(
            check(&reports),
            Err(Violation::Panic("participant 3 panicked: boom".to_string()))
        );
    }
}
