#[test]
fn test_trace() {
    cgotraceback::init();
    let pcs = func1();
    assert!(pcs.len() > 3);
    let mut names = vec![];
    for pc in pcs {
        backtrace::resolve(pc as _, |s| {
            names.push(s.name().unwrap().as_str().unwrap().to_string());
        })
    }
    assert!(names.len() > 3);
    assert!(names[0].contains("func3"));
    assert!(names[1].contains("func2"));
    assert!(names[2].contains("func1"));
    assert!(names[3].contains("test_trace"));
}

#[test]
fn test_walk_here_skip() {
    cgotraceback::init();
    let mut all = [0; 64];
    let mut skipped = [0; 64];
    let n = skip_two(&mut all, &mut skipped);
    assert!(n > 2);
    // Above `skip_two` and its caller both walks see the same frames.
    assert_eq!(&all[2..n], &skipped[..n - 2]);
}

#[inline(never)]
fn skip_two(all: &mut [usize], skipped: &mut [usize]) -> usize {
    let n = cgotraceback::walk_here(all, 0);
    let m = cgotraceback::walk_here(skipped, 2);
    assert_eq!(m, n - 2);
    n as usize
}

#[inline(always)]
fn func1() -> Vec<usize> {
    func2()
}

#[inline(never)]
fn func2() -> Vec<usize> {
    func3()
}

#[inline(never)]
fn func3() -> Vec<usize> {
    let mut pcs = vec![0; 64];
    let n = cgotraceback::trace(&mut pcs);
    pcs.truncate(n);
    pcs
}
