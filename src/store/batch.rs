use futures::future::join_all;
use std::future::Future;

/// Run `task` over `items` in sequential waves of at most `wave_size`.
///
/// Every task of a wave is awaited together and a failing task never
/// cancels its siblings. The next wave starts once the whole wave has
/// settled; `on_wave(done, total)` is called after each one. Results keep
/// input order.
pub async fn run_in_waves<T, R, F, Fut>(
    items: Vec<T>,
    wave_size: usize,
    task: F,
    mut on_wave: impl FnMut(usize, usize),
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let wave_size = wave_size.max(1);
    let total = items.len().div_ceil(wave_size);
    let mut results = Vec::with_capacity(items.len());

    let mut remaining = items.into_iter().peekable();
    let mut done = 0;
    while remaining.peek().is_some() {
        let wave: Vec<T> = remaining.by_ref().take(wave_size).collect();
        results.extend(join_all(wave.into_iter().map(&task)).await);
        done += 1;
        on_wave(done, total);
    }

    results
}
